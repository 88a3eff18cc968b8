//! Static registry of resources shipped inside the tool checkout.
//!
//! Names are stable identifiers used by the hosting launcher; paths are
//! relative to the repository root and always use `/` as separator.

use std::path::{Path, PathBuf};

use crate::error::BootstrapError;

/// Symbolic resource name to repository-relative path.
pub const RESOURCES: &[(&str, &str)] = &[
    ("abi_processor_classes", "build/abi_processor/classes"),
    ("android_agent_path", "assets/android/agent.apk"),
    ("build_type_info", "config/build_type/LOCAL/type.txt"),
    ("classpath_entries", "programs/classpaths"),
    ("dx", "third-party/java/dx/etc/dx"),
    ("jacoco_agent_jar", "third-party/java/jacoco/jacocoagent.jar"),
    ("logging_config_file", "config/logging.properties.st"),
    (
        "native_exopackage_fake_path",
        "assets/android/native-exopackage-fakes.apk",
    ),
    ("path_to_pex", "src/python/make_pex.py"),
    ("path_to_sh_binary_template", "src/shell/sh_binary_template"),
    ("path_to_static_content", "webserver/static"),
    ("report_generator_jar", "build/report-generator.jar"),
    ("server", "bin/tool"),
    ("testrunner_classes", "build/testrunner/classes"),
    ("bootstrapper_jar", "build/bootstrapper/bootstrapper.jar"),
    ("path_to_pathlib_py", "third-party/py/pathlib/pathlib.py"),
    ("path_to_pywatchman", "third-party/py/pywatchman"),
];

/// Maps resource names to paths under a repository root.
///
/// Lookups never touch the filesystem: a resolved path may legitimately not
/// exist yet (e.g. build outputs before the first build).
#[derive(Debug, Clone)]
pub struct ResourceLocator {
    root: PathBuf,
}

impl ResourceLocator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `name` to `root` joined with its registered relative path.
    pub fn locate(&self, name: &str) -> Result<PathBuf, BootstrapError> {
        let relative = RESOURCES
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, path)| *path)
            .ok_or_else(|| BootstrapError::UnknownResource {
                name: name.to_string(),
            })?;
        Ok(join_relative(&self.root, relative))
    }

    /// Registered names in registry order.
    pub fn names() -> impl Iterator<Item = &'static str> {
        RESOURCES.iter().map(|(name, _)| *name)
    }
}

/// Join a `/`-separated relative path onto `root` component by component.
pub fn join_relative(root: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .filter(|part| !part.is_empty())
        .fold(root.to_path_buf(), |acc, part| acc.join(part))
}
