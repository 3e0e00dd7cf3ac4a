//! Shared test utilities for E2E tests
//!
//! ## SDR Tree
//!
//! Every test builds its own profile tree in a temporary directory:
//!
//! - `/devices/GPP/GPP.spd.yaml`: executable device package whose code is a
//!   shell script that just sleeps, standing in for a real device process
//! - `/devices/GPP/GPP.prf.yaml`: one external allocation property, `capacity`
//! - `/nodes/TestNode/DeviceManager.dcd.yaml`: a node placing one `GPP` instance
//!
//! The launched script cannot call back into the daemon, so tests register a
//! `LocalDevice` on its behalf with the same instantiation id. The device
//! manager then ties the registration to the launched pid.
//!
//! ## Usage Pattern
//!
//! ```rust,ignore
//! #[tokio::test]
//! #[serial]
//! async fn my_test() {
//!     let tree = SdrTree::new();
//!     let plane = ControlPlane::new(tree.settings("REDHAWK_TEST"));
//!     plane.start().await.unwrap();
//!     let device = register_gpp(&plane, 10.0).await;
//!     // ...
//!     plane.shutdown().await;
//! }
//! ```

use sdr_engine::application::{ControlPlane, ControlPlaneSettings};
use sdr_engine::domain::ports::Device;
use sdr_engine::infrastructure::LocalDevice;
use std::future::Future;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const NODE_DCD: &str = "/nodes/TestNode/DeviceManager.dcd.yaml";
pub const GPP_SPD: &str = "/devices/GPP/GPP.spd.yaml";
pub const GPP_ID: &str = "DCE:gpp-1";
pub const GPP_LABEL: &str = "GPP_1";
pub const NODE_LABEL: &str = "TestNode";

// Install a log subscriber before any test runs; RUST_LOG selects the level
#[ctor::ctor]
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Profile tree in a temporary directory, removed on drop
pub struct SdrTree {
    dir: TempDir,
}

impl SdrTree {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create SDR root");
        let tree = Self { dir };

        tree.write(
            GPP_SPD,
            r#"
id: DCE:gpp-spd
name: GPP
component_type: executable_device
properties_file: GPP.prf.yaml
implementations:
  - id: sh
    code: {local_file: bin/gpp.sh}
"#,
        );
        tree.write(
            "/devices/GPP/GPP.prf.yaml",
            r#"
properties:
  - id: capacity
    type: double
    kinds: [allocation]
    action: external
"#,
        );
        tree.write("/devices/GPP/bin/gpp.sh", "#!/bin/sh\nexec sleep 30\n");
        tree.make_executable("/devices/GPP/bin/gpp.sh");
        tree.write(
            NODE_DCD,
            &format!(
                r#"
id: DCE:node-1
name: {NODE_LABEL}
placements:
  - file: {GPP_SPD}
    instantiations:
      - id: {GPP_ID}
        usage_name: {GPP_LABEL}
"#
            ),
        );
        tree
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Settings for a control plane running the test node
    pub fn settings(&self, domain_name: &str) -> ControlPlaneSettings {
        let mut settings = ControlPlaneSettings::new(domain_name, self.root());
        settings.node_config = Some(NODE_DCD.to_string());
        settings
    }

    /// Settings for a control plane without a node
    pub fn domain_only_settings(&self, domain_name: &str) -> ControlPlaneSettings {
        ControlPlaneSettings::new(domain_name, self.root())
    }

    pub fn state_file(&self) -> PathBuf {
        self.root().join("state").join("domain.json")
    }

    pub fn write(&self, path: &str, content: &str) {
        let full = self.root().join(path.trim_start_matches('/'));
        std::fs::create_dir_all(full.parent().expect("profile path has a parent"))
            .expect("Failed to create profile directory");
        std::fs::write(full, content).expect("Failed to write profile");
    }

    fn make_executable(&self, path: &str) {
        let full = self.root().join(path.trim_start_matches('/'));
        let mut perms = std::fs::metadata(&full)
            .expect("Failed to stat script")
            .permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(full, perms).expect("Failed to chmod script");
    }
}

impl Default for SdrTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Pid of the launched GPP process, waiting for the launch if needed
pub async fn gpp_pid(plane: &ControlPlane) -> u32 {
    let manager = plane.device_manager().expect("plane runs a node");
    wait_for("GPP launch", || {
        let manager = manager.clone();
        async move {
            manager
                .pending_devices()
                .await
                .iter()
                .find(|p| p.identifier == GPP_ID)
                .map(|p| p.pid)
        }
    })
    .await
}

/// Register a GPP device on behalf of the launched process
pub async fn register_gpp(plane: &ControlPlane, capacity: f64) -> Arc<LocalDevice> {
    let device = LocalDevice::new(GPP_ID, GPP_LABEL, GPP_SPD).with_capacity("capacity", capacity);
    let handle: Arc<dyn Device> = device.clone();
    plane.broker().register_device(&handle);
    plane
        .device_manager()
        .expect("plane runs a node")
        .register_device(Some(handle))
        .await
        .expect("Failed to register GPP");
    device
}

/// Whether a process with this pid still exists
pub fn process_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

/// Poll `check` every 50ms until it yields a value, failing after 10s
pub async fn wait_for<T, F, Fut>(what: &str, mut check: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        if let Some(value) = check().await {
            return value;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("Timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
