//! DeviceManager
//! Supervises the device and service processes of one node. Every placement of
//! the node's deployment descriptor is launched as a child process and tracked
//! as pending until it registers back; registrations are relayed to the domain.
//!
//! Lifecycle: Constructing -> Registering -> Registered -> ShuttingDown -> Shutdown

use crate::domain::constants::{
    COMPOSITE_PARENT_POLL_ATTEMPTS, COMPOSITE_PARENT_POLL_INTERVAL, DEFAULT_EVENT_CHANNEL,
    DEVICE_TERMINATE_GRACE, DOMAIN_RESOLVE_RETRY, PROCESS_POLL_INTERVAL,
    REGISTRATION_RETRY_DELAY, RELEASE_DEVICE_TIMEOUT, SERVICE_TERMINATE_GRACE,
    SIGKILL_REAP_TIMEOUT,
};
use crate::domain::entities::{
    ComponentInstantiation, ComponentPlacement, DeviceConfiguration, Implementation, Properties,
    PropertyKind, SoftPkg,
};
use crate::domain::ports::{
    Device, DeviceManagerRef, DomainManagerRef, LaunchConfig, LaunchResult, NamingService,
    ObjectBroker, ObjectRef, ProcessLauncher, ProfileRepository, RemoteObject,
};
use crate::domain::services::child_watching_service::{ChildExitEvent, ChildWatchingService};
use crate::domain::services::exec_params::{build_exec_params, to_argv, ExecContext};
use crate::domain::value_objects::{AdminState, DataType};
use crate::domain::{DomainError, NamingError, RemoteError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct DeviceManagerSettings {
    /// Profile path of the node deployment descriptor
    pub dcd_profile: String,
    /// Overrides the domain named by the descriptor
    pub domain_name: Option<String>,
    pub processor: String,
    pub os_name: String,
    pub logging_config_uri: Option<String>,
    pub debug_level: u8,
}

impl DeviceManagerSettings {
    pub fn new(dcd_profile: impl Into<String>) -> Self {
        Self {
            dcd_profile: dcd_profile.into(),
            domain_name: None,
            processor: std::env::consts::ARCH.to_string(),
            os_name: host_os_name().to_string(),
            logging_config_uri: None,
            debug_level: 3,
        }
    }
}

fn host_os_name() -> &'static str {
    match std::env::consts::OS {
        "linux" => "Linux",
        "macos" => "Darwin",
        other => other,
    }
}

/// A launched child that has not registered yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingProcess {
    pub identifier: String,
    pub label: String,
    pub pid: u32,
}

struct RegisteredDevice {
    identifier: String,
    label: String,
    pid: Option<u32>,
    device: Arc<dyn Device>,
}

struct RegisteredService {
    name: String,
    pid: Option<u32>,
    service: ObjectRef,
}

enum Departed {
    Device(RegisteredDevice),
    Service(RegisteredService),
}

#[derive(Default)]
struct SupervisorState {
    admin: AdminState,
    identifier: String,
    label: String,
    domain_name: String,
    configuration: Option<DeviceConfiguration>,
    domain: Option<Arc<dyn DomainManagerRef>>,
    pending_devices: Vec<PendingProcess>,
    pending_services: Vec<PendingProcess>,
    devices: Vec<RegisteredDevice>,
    services: Vec<RegisteredService>,
    /// Instantiation id -> implementation id chosen at launch
    implementations: HashMap<String, String>,
}

impl SupervisorState {
    fn naming_context(&self) -> String {
        format!("{}/{}", self.domain_name, self.label)
    }

    fn forwards_to_domain(&self) -> Option<Arc<dyn DomainManagerRef>> {
        match self.admin {
            AdminState::Registered => self.domain.clone(),
            _ => None,
        }
    }
}

pub struct DeviceManager {
    ior: String,
    settings: DeviceManagerSettings,
    profiles: Arc<dyn ProfileRepository>,
    naming: Arc<dyn NamingService>,
    broker: Arc<dyn ObjectBroker>,
    launcher: Arc<dyn ProcessLauncher>,
    watcher: ChildWatchingService,
    exit_rx: Mutex<Option<mpsc::UnboundedReceiver<ChildExitEvent>>>,
    state: Mutex<SupervisorState>,
    /// Cancelled when shutdown begins
    cancel: CancellationToken,
    /// Cancelled when shutdown has finished
    finished: CancellationToken,
    this: Weak<DeviceManager>,
}

impl DeviceManager {
    pub fn new(
        settings: DeviceManagerSettings,
        profiles: Arc<dyn ProfileRepository>,
        naming: Arc<dyn NamingService>,
        broker: Arc<dyn ObjectBroker>,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Arc<Self> {
        let (watcher, exit_rx) = ChildWatchingService::new();
        Arc::new_cyclic(|this| Self {
            ior: format!("IOR:DeviceManager:{}", Uuid::new_v4()),
            settings,
            profiles,
            naming,
            broker,
            launcher,
            watcher,
            exit_rx: Mutex::new(Some(exit_rx)),
            state: Mutex::new(SupervisorState::default()),
            cancel: CancellationToken::new(),
            finished: CancellationToken::new(),
            this: this.clone(),
        })
    }

    fn handle(&self) -> Option<Arc<dyn DeviceManagerRef>> {
        self.this
            .upgrade()
            .map(|manager| manager as Arc<dyn DeviceManagerRef>)
    }

    pub async fn admin_state(&self) -> AdminState {
        self.state.lock().await.admin
    }

    /// `<domain>/<label>`, empty parts until started
    pub async fn naming_context(&self) -> String {
        self.state.lock().await.naming_context()
    }

    /// Load the node descriptor, register with the domain and launch every placement.
    /// Fails only when the node cannot come up at all.
    pub async fn start(&self) -> Result<()> {
        let dcd = self
            .profiles
            .load_device_configuration(&self.settings.dcd_profile)?;
        let domain_name = self
            .settings
            .domain_name
            .clone()
            .or_else(|| dcd.domain_name.clone())
            .ok_or_else(|| {
                DomainError::InvalidConfiguration(format!(
                    "{} does not name a domain",
                    self.settings.dcd_profile
                ))
            })?;

        {
            let mut state = self.state.lock().await;
            if state.admin != AdminState::Constructing {
                return Err(DomainError::InvalidConfiguration(format!(
                    "device manager {} already started",
                    state.identifier
                )));
            }
            state.identifier = dcd.id.clone();
            state.label = dcd.name.clone();
            state.domain_name = domain_name.clone();
            state.configuration = Some(dcd.clone());
            state.admin = AdminState::Registering;
        }
        info!(
            device_manager_id = %dcd.id,
            label = %dcd.name,
            domain = %domain_name,
            "Starting device manager"
        );

        self.spawn_reaper().await;

        let domain = self.resolve_domain(&domain_name).await?;
        self.bind_naming_context(&format!("{domain_name}/{}", dcd.name))
            .await?;
        self.state.lock().await.domain = Some(domain.clone());
        self.register_with_domain(domain.as_ref()).await?;

        {
            let mut state = self.state.lock().await;
            if state.admin != AdminState::Registering {
                return Err(DomainError::ShuttingDown);
            }
            state.admin = AdminState::Registered;
        }
        info!(device_manager_id = %dcd.id, "Device manager registered with domain");

        self.launch_placements(&dcd).await;
        Ok(())
    }

    /// Resolves once shutdown has completed
    pub async fn wait_for_shutdown(&self) {
        self.finished.cancelled().await;
    }

    async fn spawn_reaper(&self) {
        let Some(mut exit_rx) = self.exit_rx.lock().await.take() else {
            return;
        };
        let this = self.this.clone();
        let finished = self.finished.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = finished.cancelled() => break,
                    event = exit_rx.recv() => {
                        let (Some(event), Some(manager)) = (event, this.upgrade()) else {
                            break;
                        };
                        manager.child_exited(event).await;
                    }
                }
            }
            debug!("Child reaper stopped");
        });
    }

    async fn resolve_domain(&self, domain_name: &str) -> Result<Arc<dyn DomainManagerRef>> {
        let path = format!("{domain_name}/{domain_name}");
        loop {
            match self.naming.resolve(&path).await {
                Ok(object) => match self.broker.domain_manager(&object.ior()) {
                    Some(domain) => return Ok(domain),
                    None => warn!(path = %path, "Object bound at domain path is not a domain manager"),
                },
                Err(e) => debug!(path = %path, error = %e, "Domain manager not available yet"),
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return Err(DomainError::ShuttingDown),
                _ = tokio::time::sleep(DOMAIN_RESOLVE_RETRY) => {}
            }
        }
    }

    async fn bind_naming_context(&self, context: &str) -> Result<()> {
        match self.naming.bind_new_context(context).await {
            Ok(()) => Ok(()),
            Err(NamingError::AlreadyBound(_)) => {
                debug!(context = %context, "Naming context already exists");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn register_with_domain(&self, domain: &dyn DomainManagerRef) -> Result<()> {
        match domain.register_device_manager(self.handle()).await {
            Err(e) if e.is_transient() => {
                warn!(error = %e, "Transient failure registering with domain, retrying once");
                tokio::select! {
                    _ = self.cancel.cancelled() => return Err(DomainError::ShuttingDown),
                    _ = tokio::time::sleep(REGISTRATION_RETRY_DELAY) => {}
                }
                domain
                    .register_device_manager(self.handle())
                    .await
                    .map_err(|e| DomainError::RegisterError(format!("registration with domain failed: {e}")))
            }
            result => result,
        }
    }

    async fn launch_placements(&self, dcd: &DeviceConfiguration) {
        for placement in &dcd.placements {
            for instantiation in &placement.instantiations {
                if self.cancel.is_cancelled() {
                    return;
                }
                if let Err(e) = self.launch_component(placement, instantiation).await {
                    error!(
                        instantiation_id = %instantiation.id,
                        profile = %placement.file,
                        error = %e,
                        "Unable to launch component"
                    );
                }
            }
        }
    }

    async fn launch_component(
        &self,
        placement: &ComponentPlacement,
        instantiation: &ComponentInstantiation,
    ) -> Result<u32> {
        if let Some(target) = &placement.deploy_on_device {
            return Err(DomainError::UnsupportedDeployment(format!(
                "{} requests deployment on device {target}",
                instantiation.id
            )));
        }

        let spd = self.profiles.load_soft_pkg(&placement.file)?;
        let implementation = spd
            .implementations
            .iter()
            .find(|i| i.runs_on(&self.settings.processor, &self.settings.os_name))
            .ok_or_else(|| DomainError::NoMatchingImplementation(instantiation.id.clone()))?;
        let properties = self.component_properties(&placement.file, &spd, Some(implementation));

        let composite_device_ior = match &placement.composite_part_of {
            Some(parent_id) => Some(self.wait_for_composite_parent(&instantiation.id, parent_id).await?),
            None => None,
        };

        let (dom_path, domain_name) = {
            let state = self.state.lock().await;
            (state.naming_context(), state.domain_name.clone())
        };
        let event_channel_ior = if spd.is_service() {
            None
        } else {
            self.naming
                .resolve(&format!("{domain_name}/{DEFAULT_EVENT_CHANNEL}"))
                .await
                .ok()
                .map(|channel| channel.ior())
        };

        let params = build_exec_params(&ExecContext {
            device_manager_ior: &self.ior,
            profile: &placement.file,
            instantiation,
            is_service: spd.is_service(),
            composite_device_ior: composite_device_ior.as_deref(),
            event_channel_ior: event_channel_ior.as_deref(),
            logging_config_uri: self.settings.logging_config_uri.as_deref(),
            debug_level: self.settings.debug_level,
            dom_path: &dom_path,
            properties: &properties,
        });

        let code_path = self.profiles.local_path(
            &self
                .profiles
                .relative_to(&placement.file, &implementation.code.local_file),
        );
        ensure_executable(&code_path, &instantiation.id)?;

        let config = LaunchConfig {
            program: code_path.to_string_lossy().into_owned(),
            args: to_argv(&params),
            working_dir: code_path
                .parent()
                .map(|dir| dir.to_string_lossy().into_owned()),
            env_vars: Vec::new(),
        };
        let LaunchResult { pid, exit_handle } = self.launcher.launch(config).await?;

        {
            let mut state = self.state.lock().await;
            state
                .implementations
                .insert(instantiation.id.clone(), implementation.id.clone());
            let pending = PendingProcess {
                identifier: instantiation.id.clone(),
                label: instantiation.usage_name.clone(),
                pid,
            };
            if spd.is_service() {
                state.pending_services.push(pending);
            } else {
                state.pending_devices.push(pending);
            }
        }
        self.watcher
            .watch_child(pid, &instantiation.usage_name, exit_handle);

        info!(
            instantiation_id = %instantiation.id,
            label = %instantiation.usage_name,
            implementation = %implementation.id,
            pid = pid,
            "Launched component"
        );
        Ok(pid)
    }

    /// Base property file merged with the implementation's. Unreadable files are skipped.
    fn component_properties(
        &self,
        spd_path: &str,
        spd: &SoftPkg,
        implementation: Option<&Implementation>,
    ) -> Properties {
        let mut properties = Properties::default();
        let files = spd
            .properties_file
            .iter()
            .chain(implementation.and_then(|i| i.properties_file.as_ref()));
        for file in files {
            let path = self.profiles.relative_to(spd_path, file);
            match self.profiles.load_properties(&path) {
                Ok(prf) => properties.merge(&prf),
                Err(e) => warn!(profile = %path, error = %e, "Unable to load property file"),
            }
        }
        properties
    }

    async fn wait_for_composite_parent(&self, child_id: &str, parent_id: &str) -> Result<String> {
        for _ in 0..COMPOSITE_PARENT_POLL_ATTEMPTS {
            let parent = {
                let state = self.state.lock().await;
                state
                    .devices
                    .iter()
                    .find(|d| d.identifier == parent_id)
                    .map(|d| d.device.ior())
            };
            if let Some(ior) = parent {
                return Ok(ior);
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return Err(DomainError::ShuttingDown),
                _ = tokio::time::sleep(COMPOSITE_PARENT_POLL_INTERVAL) => {}
            }
        }
        Err(DomainError::LaunchFailed {
            id: child_id.to_string(),
            reason: format!("composite parent {parent_id} never registered"),
        })
    }

    pub async fn register_device(&self, device: Option<Arc<dyn Device>>) -> Result<()> {
        let device = device.ok_or_else(|| {
            DomainError::InvalidObjectReference("cannot register a nil device".to_string())
        })?;
        let identifier = device.identifier().await?;
        let label = device.label().await?;

        let (implementation_id, configuration) = {
            let state = self.state.lock().await;
            if state.admin.is_terminating() {
                return Err(DomainError::RegisterError(format!(
                    "device manager is shutting down, rejecting device {identifier}"
                )));
            }
            if state.devices.iter().any(|d| d.identifier == identifier) {
                info!(device_id = %identifier, "Device already registered");
                return Ok(());
            }
            (
                state.implementations.get(&identifier).cloned(),
                state.configuration.clone(),
            )
        };

        device.initialize().await.map_err(|e| {
            DomainError::RegisterError(format!("device {identifier} failed to initialize: {e}"))
        })?;

        let overrides = self
            .configure_overrides(
                device.as_ref(),
                &identifier,
                implementation_id.as_deref(),
                configuration.as_ref(),
            )
            .await;
        if !overrides.is_empty() {
            if let Err(e) = device.configure(&overrides).await {
                warn!(device_id = %identifier, error = %e, "Device rejected configuration overrides");
            }
        }

        let (context, domain) = {
            let mut state = self.state.lock().await;
            if state.devices.iter().any(|d| d.identifier == identifier) {
                return Ok(());
            }
            let pid = state
                .pending_devices
                .iter()
                .position(|p| p.identifier == identifier)
                .map(|pos| state.pending_devices.remove(pos).pid);
            state.devices.push(RegisteredDevice {
                identifier: identifier.clone(),
                label: label.clone(),
                pid,
                device: device.clone(),
            });
            (state.naming_context(), state.forwards_to_domain())
        };

        if let Err(e) = self
            .naming
            .rebind(&format!("{context}/{label}"), device.clone())
            .await
        {
            warn!(device_id = %identifier, error = %e, "Unable to bind device name");
        }
        info!(device_id = %identifier, label = %label, "Device registered");

        if let Some(domain) = domain {
            if let Err(e) = domain.register_device(Some(device), self.handle()).await {
                error!(device_id = %identifier, error = %e, "Domain rejected device registration");
            }
        }
        Ok(())
    }

    /// Configure-kind overrides from the node descriptor that the device accepts
    async fn configure_overrides(
        &self,
        device: &dyn Device,
        identifier: &str,
        implementation_id: Option<&str>,
        configuration: Option<&DeviceConfiguration>,
    ) -> Vec<DataType> {
        let Some((_, instantiation)) = configuration.and_then(|dcd| dcd.instantiation(identifier))
        else {
            return Vec::new();
        };
        if instantiation.overrides.is_empty() {
            return Vec::new();
        }

        let properties = match device.software_profile().await {
            Ok(profile) => match self.profiles.load_soft_pkg(&profile) {
                Ok(spd) => {
                    let implementation = implementation_id.and_then(|id| spd.implementation(id));
                    self.component_properties(&profile, &spd, implementation)
                }
                Err(e) => {
                    warn!(device_id = %identifier, error = %e, "Unable to load device profile");
                    Properties::default()
                }
            },
            Err(e) => {
                warn!(device_id = %identifier, error = %e, "Unable to read device profile path");
                Properties::default()
            }
        };

        instantiation
            .overrides
            .iter()
            .filter(|o| {
                let Some(def) = properties.get(&o.id) else {
                    warn!(device_id = %identifier, property = %o.id, "Override names an unknown property");
                    return false;
                };
                if def.is_readonly() {
                    warn!(device_id = %identifier, property = %o.id, "Readonly property cannot be overridden");
                    return false;
                }
                if !def.is_simple() {
                    warn!(device_id = %identifier, property = %o.id, "Skipping non-simple override");
                    return false;
                }
                def.has_kind(PropertyKind::Configure) || def.has_kind(PropertyKind::Property)
            })
            .cloned()
            .collect()
    }

    pub async fn unregister_device(&self, device: Option<Arc<dyn Device>>) -> Result<()> {
        let device = device.ok_or_else(|| {
            DomainError::InvalidObjectReference("cannot unregister a nil device".to_string())
        })?;
        let ior = device.ior();

        let (removed, context, domain) = {
            let mut state = self.state.lock().await;
            let pos = state
                .devices
                .iter()
                .position(|d| d.device.ior() == ior)
                .ok_or_else(|| {
                    DomainError::InvalidObjectReference(format!("device {ior} is not registered"))
                })?;
            let removed = state.devices.remove(pos);
            (removed, state.naming_context(), state.forwards_to_domain())
        };

        self.unbind_quietly(&format!("{context}/{}", removed.label)).await;
        if let Some(domain) = domain {
            if let Err(e) = domain.unregister_device(Some(device)).await {
                warn!(device_id = %removed.identifier, error = %e, "Unable to unregister device from domain");
            }
        }
        info!(device_id = %removed.identifier, "Device unregistered");
        Ok(())
    }

    pub async fn register_service(&self, service: Option<ObjectRef>, name: &str) -> Result<()> {
        let service = service.ok_or_else(|| {
            DomainError::InvalidObjectReference(format!("cannot register nil service {name}"))
        })?;

        let (pending, path, domain) = {
            let mut state = self.state.lock().await;
            if state.admin.is_terminating() {
                return Err(DomainError::RegisterError(format!(
                    "device manager is shutting down, rejecting service {name}"
                )));
            }
            if state.services.iter().any(|s| s.name == name) {
                info!(service = %name, "Service already registered");
                return Ok(());
            }
            let pending = state
                .pending_services
                .iter()
                .position(|p| p.label == name)
                .map(|pos| state.pending_services.remove(pos));
            state.services.push(RegisteredService {
                name: name.to_string(),
                pid: pending.as_ref().map(|p| p.pid),
                service: service.clone(),
            });
            (
                pending,
                format!("{}/{name}", state.domain_name),
                state.forwards_to_domain(),
            )
        };

        if let Err(e) = self.naming.rebind(&path, service.clone()).await {
            warn!(service = %name, error = %e, "Unable to bind service name");
        }

        if let Some(domain) = domain {
            if let Err(e) = domain
                .register_service(Some(service), self.handle(), name)
                .await
            {
                error!(service = %name, error = %e, "Domain rejected service, rolling back");
                {
                    let mut state = self.state.lock().await;
                    state.services.retain(|s| s.name != name);
                    if let Some(pending) = pending {
                        state.pending_services.push(pending);
                    }
                }
                self.unbind_quietly(&path).await;
                return Err(e);
            }
        }
        info!(service = %name, "Service registered");
        Ok(())
    }

    pub async fn unregister_service(&self, service: Option<ObjectRef>, name: &str) -> Result<()> {
        let service = service.ok_or_else(|| {
            DomainError::InvalidObjectReference(format!("cannot unregister nil service {name}"))
        })?;

        let (path, domain) = {
            let mut state = self.state.lock().await;
            let pos = state
                .services
                .iter()
                .position(|s| s.name == name)
                .ok_or_else(|| {
                    DomainError::InvalidObjectReference(format!("service {name} is not registered"))
                })?;
            state.services.remove(pos);
            (
                format!("{}/{name}", state.domain_name),
                state.forwards_to_domain(),
            )
        };

        self.unbind_quietly(&path).await;
        if let Some(domain) = domain {
            if let Err(e) = domain.unregister_service(Some(service), name).await {
                warn!(service = %name, error = %e, "Unable to unregister service from domain");
            }
        }
        info!(service = %name, "Service unregistered");
        Ok(())
    }

    pub async fn registered_services(&self) -> Vec<(String, ObjectRef)> {
        let state = self.state.lock().await;
        state
            .services
            .iter()
            .map(|s| (s.name.clone(), s.service.clone()))
            .collect()
    }

    pub async fn pending_devices(&self) -> Vec<PendingProcess> {
        self.state.lock().await.pending_devices.clone()
    }

    pub async fn pending_services(&self) -> Vec<PendingProcess> {
        self.state.lock().await.pending_services.clone()
    }

    /// Reap one child. Pending entries are dropped, registered ones are
    /// unregistered from the domain.
    pub async fn child_exited(&self, event: ChildExitEvent) {
        let (departed, context, domain_name, domain) = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            for pending in [&mut state.pending_devices, &mut state.pending_services] {
                if let Some(pos) = pending.iter().position(|p| p.pid == event.pid) {
                    let process = pending.remove(pos);
                    warn!(
                        instantiation_id = %process.identifier,
                        pid = event.pid,
                        "Child exited before registering"
                    );
                    return;
                }
            }

            let departed = if let Some(pos) = state.devices.iter().position(|d| d.pid == Some(event.pid)) {
                Departed::Device(state.devices.remove(pos))
            } else if let Some(pos) = state.services.iter().position(|s| s.pid == Some(event.pid)) {
                Departed::Service(state.services.remove(pos))
            } else {
                debug!(pid = event.pid, "Exit of an untracked child");
                return;
            };
            (
                departed,
                state.naming_context(),
                state.domain_name.clone(),
                state.forwards_to_domain(),
            )
        };

        match departed {
            Departed::Device(device) => {
                warn!(device_id = %device.identifier, pid = event.pid, "Registered device process died");
                self.unbind_quietly(&format!("{context}/{}", device.label)).await;
                if let Some(domain) = domain {
                    if let Err(e) = domain.unregister_device(Some(device.device)).await {
                        warn!(device_id = %device.identifier, error = %e, "Unable to unregister dead device");
                    }
                }
            }
            Departed::Service(service) => {
                warn!(service = %service.name, pid = event.pid, "Registered service process died");
                self.unbind_quietly(&format!("{domain_name}/{}", service.name)).await;
                if let Some(domain) = domain {
                    if let Err(e) = domain
                        .unregister_service(Some(service.service), &service.name)
                        .await
                    {
                        warn!(service = %service.name, error = %e, "Unable to unregister dead service");
                    }
                }
            }
        }
    }

    /// Idempotent. Cleanup continues past every failure.
    pub async fn shutdown(&self) {
        let (was_registered, domain, context, domain_name) = {
            let mut state = self.state.lock().await;
            if state.admin.is_terminating() {
                debug!("Device manager shutdown already requested");
                return;
            }
            let was_registered = state.admin == AdminState::Registered;
            state.admin = AdminState::ShuttingDown;
            (
                was_registered,
                state.domain.clone(),
                state.naming_context(),
                state.domain_name.clone(),
            )
        };
        self.cancel.cancel();
        info!(context = %context, "Shutting down device manager");

        if was_registered {
            if let Some(domain) = &domain {
                if let Err(e) = domain.unregister_device_manager(self.handle()).await {
                    warn!(error = %e, "Unable to unregister from domain, continuing cleanup");
                }
            }
        }

        self.terminate_services(&domain_name).await;
        let (released, unreachable) = self.release_devices(&context).await;
        self.terminate_devices(released, unreachable).await;

        if let Err(e) = self.naming.destroy_context(&context).await {
            warn!(context = %context, error = %e, "Unable to remove naming context");
        }

        self.state.lock().await.admin = AdminState::Shutdown;
        self.finished.cancel();
        info!(context = %context, "Device manager shut down");
    }

    async fn terminate_services(&self, domain_name: &str) {
        let (services, pending) = {
            let mut state = self.state.lock().await;
            (
                std::mem::take(&mut state.services),
                std::mem::take(&mut state.pending_services),
            )
        };

        for service in &services {
            self.unbind_quietly(&format!("{domain_name}/{}", service.name))
                .await;
        }
        let pids: Vec<u32> = services
            .iter()
            .filter_map(|s| s.pid)
            .chain(pending.iter().map(|p| p.pid))
            .collect();
        self.terminate_processes(&pids, SERVICE_TERMINATE_GRACE).await;
    }

    /// Release every registered device. Returns the pids of launched devices
    /// that released and of those that could not be reached.
    async fn release_devices(&self, context: &str) -> (Vec<u32>, Vec<u32>) {
        let devices = std::mem::take(&mut self.state.lock().await.devices);
        let mut released = Vec::new();
        let mut unreachable = Vec::new();

        for device in devices {
            self.unbind_quietly(&format!("{context}/{}", device.label))
                .await;
            let outcome = tokio::time::timeout(RELEASE_DEVICE_TIMEOUT, device.device.release_object()).await;
            let ok = match outcome {
                Ok(Ok(())) => {
                    debug!(device_id = %device.identifier, "Device released");
                    true
                }
                Ok(Err(e)) => {
                    warn!(device_id = %device.identifier, error = %e, "Device release failed");
                    false
                }
                Err(_) => {
                    warn!(device_id = %device.identifier, "Device release timed out");
                    false
                }
            };
            match (device.pid, ok) {
                (Some(pid), true) => released.push(pid),
                (Some(pid), false) => unreachable.push(pid),
                (None, _) => {}
            }
        }
        (released, unreachable)
    }

    async fn terminate_devices(&self, released: Vec<u32>, unreachable: Vec<u32>) {
        let pending = std::mem::take(&mut self.state.lock().await.pending_devices);

        let mut stragglers = self.wait_for_exit(released, DEVICE_TERMINATE_GRACE).await;
        stragglers.extend(unreachable);
        stragglers.extend(pending.iter().map(|p| p.pid));
        self.terminate_processes(&stragglers, DEVICE_TERMINATE_GRACE)
            .await;
    }

    /// SIGTERM, wait out the grace window, then SIGKILL and a bounded reap
    async fn terminate_processes(&self, pids: &[u32], grace: Duration) {
        if pids.is_empty() {
            return;
        }
        for pid in pids {
            if self.launcher.is_running(*pid).await {
                if let Err(e) = self.launcher.signal(*pid, libc::SIGTERM).await {
                    warn!(pid = pid, error = %e, "Unable to send SIGTERM");
                }
            }
        }

        let remaining = self.wait_for_exit(pids.to_vec(), grace).await;
        for pid in &remaining {
            warn!(pid = pid, "Process ignored SIGTERM, sending SIGKILL");
            if let Err(e) = self.launcher.signal(*pid, libc::SIGKILL).await {
                warn!(pid = pid, error = %e, "Unable to send SIGKILL");
            }
        }

        for pid in self.wait_for_exit(remaining, SIGKILL_REAP_TIMEOUT).await {
            error!(pid = pid, "Process still running after SIGKILL");
        }
    }

    /// Poll until every pid has exited or `timeout` elapses; returns the survivors
    async fn wait_for_exit(&self, mut pids: Vec<u32>, timeout: Duration) -> Vec<u32> {
        let deadline = Instant::now() + timeout;
        loop {
            let mut running = Vec::with_capacity(pids.len());
            for pid in pids {
                if self.launcher.is_running(pid).await {
                    running.push(pid);
                }
            }
            pids = running;
            if pids.is_empty() || Instant::now() >= deadline {
                return pids;
            }
            tokio::time::sleep(PROCESS_POLL_INTERVAL).await;
        }
    }

    async fn unbind_quietly(&self, path: &str) {
        match self.naming.unbind(path).await {
            Ok(()) | Err(NamingError::NotFound(_)) => {}
            Err(e) => warn!(path = %path, error = %e, "Unable to unbind name"),
        }
    }
}

fn ensure_executable(path: &Path, identifier: &str) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::metadata(path).map_err(|e| DomainError::LaunchFailed {
        id: identifier.to_string(),
        reason: format!("{}: {e}", path.display()),
    })?;
    if !metadata.is_file() || metadata.permissions().mode() & 0o111 == 0 {
        return Err(DomainError::LaunchFailed {
            id: identifier.to_string(),
            reason: format!("{} is not executable", path.display()),
        });
    }
    Ok(())
}

#[async_trait]
impl RemoteObject for DeviceManager {
    fn ior(&self) -> String {
        self.ior.clone()
    }

    async fn non_existent(&self) -> bool {
        self.state.lock().await.admin == AdminState::Shutdown
    }
}

#[async_trait]
impl DeviceManagerRef for DeviceManager {
    async fn identifier(&self) -> std::result::Result<String, RemoteError> {
        Ok(self.state.lock().await.identifier.clone())
    }

    async fn label(&self) -> std::result::Result<String, RemoteError> {
        Ok(self.state.lock().await.label.clone())
    }

    async fn device_configuration_profile(&self) -> std::result::Result<String, RemoteError> {
        Ok(self.settings.dcd_profile.clone())
    }

    async fn registered_devices(&self) -> std::result::Result<Vec<Arc<dyn Device>>, RemoteError> {
        let state = self.state.lock().await;
        Ok(state.devices.iter().map(|d| d.device.clone()).collect())
    }

    async fn component_implementation_id(
        &self,
        instantiation_id: &str,
    ) -> std::result::Result<String, RemoteError> {
        let state = self.state.lock().await;
        Ok(state
            .implementations
            .get(instantiation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn shutdown(&self) -> std::result::Result<(), RemoteError> {
        DeviceManager::shutdown(self).await;
        Ok(())
    }
}
