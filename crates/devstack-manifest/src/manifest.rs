//! Manifest loading, namespace derivation, and system lookup.
//!
//! A manifest maps a project directory to a set of named systems. Systems
//! are instantiated lazily and cached per manifest, so repeated lookups of
//! the same name share one entity and its provisioning state.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use devstack_common::config::Settings;
use devstack_common::constants::{DOTENV_FILE, MANIFEST_FILE};
use devstack_common::error::{DevstackError, Result};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::graph::DependencyGraph;
use crate::system::{System, SystemDef};

/// Raw manifest file contents.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManifestDef {
    /// System definitions keyed by name.
    #[serde(default)]
    pub systems: BTreeMap<String, SystemDef>,
    /// Name of the default system; the first system name when omitted.
    #[serde(default)]
    pub default: Option<String>,
    /// Explicit namespace override; derived from the directory when omitted.
    #[serde(default)]
    pub namespace: Option<String>,
}

/// Identity of a loaded manifest, shared by all of its systems.
#[derive(Debug, Clone)]
pub struct ManifestMeta {
    /// Absolute project directory.
    pub dir: PathBuf,
    /// Project directory basename.
    pub dir_name: String,
    /// Project name, currently the directory basename.
    pub project_name: String,
    /// Stable namespace: basename plus a digest of the canonical path.
    pub namespace: String,
    /// Environment defaults read from the project's `.env` file; layered
    /// under every system's declared envs.
    pub dotenv: BTreeMap<String, String>,
}

/// A loaded manifest and its lazily instantiated systems.
#[derive(Debug)]
pub struct Manifest {
    meta: Rc<ManifestMeta>,
    defs: BTreeMap<String, SystemDef>,
    default_name: Option<String>,
    settings: Rc<Settings>,
    cache: RefCell<BTreeMap<String, Rc<System>>>,
}

impl Manifest {
    /// Builds a manifest from an already parsed definition.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, def: ManifestDef, settings: Rc<Settings>) -> Self {
        let dir = dir.into();
        let dir_name = dir
            .file_name()
            .map_or_else(|| "app".to_string(), |n| n.to_string_lossy().into_owned());
        let namespace = def
            .namespace
            .unwrap_or_else(|| derive_namespace(&dir, &dir_name));
        let default_name = def
            .default
            .or_else(|| def.systems.keys().next().cloned());
        let dotenv = load_dotenv(&dir);
        tracing::debug!(
            dir = %dir.display(),
            namespace,
            systems = def.systems.len(),
            dotenv = dotenv.len(),
            "manifest ready"
        );

        Self {
            meta: Rc::new(ManifestMeta {
                dir,
                project_name: dir_name.clone(),
                dir_name,
                namespace,
                dotenv,
            }),
            defs: def.systems,
            default_name,
            settings,
            cache: RefCell::new(BTreeMap::new()),
        }
    }

    /// Loads and parses the manifest file found in `dir`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error carrying the file path when reading fails, or
    /// a serialization error when the contents are not valid.
    pub fn load(dir: impl Into<PathBuf>, settings: Rc<Settings>) -> Result<Self> {
        let dir = dir.into();
        let path = dir.join(MANIFEST_FILE);
        let contents = fs::read_to_string(&path).map_err(|source| DevstackError::Io {
            path: path.clone(),
            source,
        })?;
        let def: ManifestDef = serde_json::from_str(&contents)?;
        Ok(Self::new(dir, def, settings))
    }

    /// Identity shared by this manifest's systems.
    #[must_use]
    pub fn meta(&self) -> &ManifestMeta {
        &self.meta
    }

    /// Project directory this manifest was loaded from.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.meta.dir
    }

    /// Stable namespace of this manifest.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.meta.namespace
    }

    /// Declared system names, in name order.
    pub fn system_names(&self) -> impl Iterator<Item = &String> {
        self.defs.keys()
    }

    /// Returns the named system, instantiating and caching it on first
    /// access.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no system of that name is declared.
    pub fn system(&self, name: &str) -> Result<Rc<System>> {
        if let Some(system) = self.cache.borrow().get(name) {
            return Ok(Rc::clone(system));
        }
        let def = self.defs.get(name).ok_or_else(|| DevstackError::NotFound {
            kind: "system",
            id: name.to_string(),
        })?;
        let system = Rc::new(System::new(
            name,
            def.clone(),
            Rc::clone(&self.meta),
            Rc::clone(&self.settings),
        ));
        let _ = self
            .cache
            .borrow_mut()
            .insert(name.to_string(), Rc::clone(&system));
        Ok(system)
    }

    /// Returns the named system after instantiating its whole dependency
    /// closure, so later `system` calls for any dependency hit the cache.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown root, `InvalidSystemReference`
    /// for an unknown dependency, or a configuration error on a cycle.
    pub fn system_deep(&self, name: &str) -> Result<Rc<System>> {
        for member in self.dependency_order(name)? {
            let _ = self.system(&member)?;
        }
        self.system(name)
    }

    /// The manifest's default system.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the manifest declares no systems.
    pub fn system_default(&self) -> Result<Rc<System>> {
        let name = self
            .default_name
            .as_deref()
            .ok_or_else(|| DevstackError::NotFound {
                kind: "system",
                id: "(default)".to_string(),
            })?;
        self.system(name)
    }

    /// Launch order of `name`'s dependency closure: every system appears
    /// after all of its dependencies, with `name` last among its own
    /// closure.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when `name` itself is unknown,
    /// `InvalidSystemReference` when a declared dependency is, or a
    /// configuration error when the closure is cyclic.
    pub fn dependency_order(&self, name: &str) -> Result<Vec<String>> {
        let mut graph = DependencyGraph::new();
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<(String, Option<String>)> = VecDeque::new();
        queue.push_back((name.to_string(), None));

        while let Some((member, referrer)) = queue.pop_front() {
            let Some(def) = self.defs.get(&member) else {
                return Err(match referrer {
                    Some(referrer) => DevstackError::InvalidSystemReference {
                        system: referrer,
                        dependency: member,
                    },
                    None => DevstackError::NotFound {
                        kind: "system",
                        id: member,
                    },
                });
            };
            if !seen.insert(member.clone()) {
                continue;
            }
            let _ = graph.add_system(&member);
            for dep in &def.depends {
                graph.add_dependency(&member, dep);
                queue.push_back((dep.clone(), Some(member.clone())));
            }
        }

        graph.resolve_order()
    }

    /// Launch order of the whole manifest.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSystemReference` for a dependency on an undeclared
    /// system, or a configuration error when dependencies are cyclic.
    pub fn launch_order(&self) -> Result<Vec<String>> {
        let mut graph = DependencyGraph::new();
        for (name, def) in &self.defs {
            let _ = graph.add_system(name);
            for dep in &def.depends {
                if !self.defs.contains_key(dep) {
                    return Err(DevstackError::InvalidSystemReference {
                        system: name.clone(),
                        dependency: dep.clone(),
                    });
                }
                graph.add_dependency(name, dep);
            }
        }
        graph.resolve_order()
    }
}

/// Derives a stable namespace from the project directory: its basename
/// plus the first hex characters of a digest of the canonical path. Two
/// checkouts of the same project in different places never collide.
/// Reads `<dir>/.env` into a flat map. A missing or unreadable file means
/// an empty map; blank lines and `#` comments are skipped, and values may
/// be wrapped in single or double quotes.
fn load_dotenv(dir: &Path) -> BTreeMap<String, String> {
    let Ok(contents) = fs::read_to_string(dir.join(DOTENV_FILE)) else {
        return BTreeMap::new();
    };
    let mut envs = BTreeMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
            .unwrap_or(value);
        let _ = envs.insert(key.trim().to_string(), value.to_string());
    }
    envs
}

fn derive_namespace(dir: &Path, dir_name: &str) -> String {
    let canonical = fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
    let digest = Sha256::digest(canonical.display().to_string().as_bytes());
    let hex: String = digest
        .iter()
        .take(5)
        .map(|b| format!("{b:02x}"))
        .collect();
    format!("{dir_name}-{hex}")
}
