//! Volume derivation: fixed manifest binds, templated mount folders, and
//! persistent per-system storage.

use std::collections::BTreeMap;
use std::path::Path;

use devstack_common::config::Settings;
use devstack_common::constants::{NAMESPACE_ROOT, PERSISTENT_MOUNT};
use devstack_common::error::Result;

use crate::manifest::ManifestMeta;
use crate::template::{ManifestView, TemplateContext, interpolate};

/// Builds the template context offered to `mount_folders` declarations.
#[must_use]
pub fn mount_context(system_name: &str, meta: &ManifestMeta, settings: &Settings) -> TemplateContext {
    let mut vars = BTreeMap::new();
    let _ = vars.insert("system_name".to_string(), system_name.to_string());
    let _ = vars.insert("persistent_folder".to_string(), PERSISTENT_MOUNT.to_string());
    let _ = vars.insert("manifest_dir".to_string(), meta.dir_name.clone());
    let _ = vars.insert(
        "manifest_project_name".to_string(),
        meta.project_name.clone(),
    );
    let _ = vars.insert(
        "devstack_default_domain".to_string(),
        settings.balancer.host.clone(),
    );
    let _ = vars.insert(
        "devstack_balancer_port".to_string(),
        settings.balancer.port.to_string(),
    );
    let _ = vars.insert(
        "devstack_balancer_ip".to_string(),
        settings.balancer.ip.clone(),
    );

    TemplateContext {
        manifest: ManifestView {
            dir: meta.dir_name.clone(),
            project_name: meta.project_name.clone(),
        },
        vars,
        ..TemplateContext::default()
    }
}

/// Resolves the regular volume table of one system.
///
/// Always binds the manifest directory to `/<root>/<system>` and its
/// parent to `/<root>/root`. User-declared mount folders are
/// template-expanded on both sides and joined onto the manifest directory
/// when the host side is relative.
///
/// # Errors
///
/// Returns `TemplateResolution` if a mount-folder template cannot be
/// expanded.
pub fn resolve(
    system_name: &str,
    mount_folders: &BTreeMap<String, String>,
    meta: &ManifestMeta,
    settings: &Settings,
) -> Result<BTreeMap<String, String>> {
    let mut volumes = BTreeMap::new();
    let _ = volumes.insert(
        meta.dir.display().to_string(),
        format!("{NAMESPACE_ROOT}/{system_name}"),
    );
    let parent = meta.dir.parent().unwrap_or(&meta.dir);
    let _ = volumes.insert(parent.display().to_string(), format!("{NAMESPACE_ROOT}/root"));

    let ctx = mount_context(system_name, meta, settings);
    for (host, guest) in mount_folders {
        let host = interpolate(host, &ctx)?;
        let guest = interpolate(guest, &ctx)?;
        let host = if host == "." || host == "./" {
            meta.dir.display().to_string()
        } else if Path::new(&host).is_absolute() {
            host
        } else {
            meta.dir
                .join(host.trim_start_matches("./"))
                .display()
                .to_string()
        };
        let _ = volumes.insert(host, guest);
    }

    Ok(volumes)
}

/// Builds the persistent volume table: a host folder namespaced by project
/// and system, bound to the fixed container data path. Data placed there
/// survives container recreation.
#[must_use]
pub fn persistent(
    namespace: &str,
    system_name: &str,
    settings: &Settings,
) -> BTreeMap<String, String> {
    let folder = settings
        .persistent_root
        .join(namespace)
        .join(system_name)
        .join("data");
    let mut volumes = BTreeMap::new();
    let _ = volumes.insert(folder.display().to_string(), PERSISTENT_MOUNT.to_string());
    volumes
}
