//! Domain constants
//! Persistence keys, exec-parameter names and supervision timings

use std::time::Duration;

// Persistence keys, restored in this order
pub const KEY_DEVICE_MANAGERS: &str = "DEVICE_MANAGERS";
pub const KEY_DEVICES: &str = "DEVICES";
pub const KEY_SERVICES: &str = "SERVICES";
pub const KEY_CONNECTIONS: &str = "CONNECTIONS";
pub const KEY_APP_FACTORIES: &str = "APP_FACTORIES";
pub const KEY_APPLICATIONS: &str = "APPLICATIONS";
pub const KEY_DOMAIN_MANAGERS: &str = "DOMAIN_MANAGERS";
pub const KEY_EVENT_CHANNELS: &str = "EVENT_CHANNELS";
pub const KEY_LOCAL_ALLOCATIONS: &str = "LOCAL_ALLOCATIONS";
pub const KEY_REMOTE_ALLOCATIONS: &str = "REMOTE_ALLOCATIONS";

// Exec parameters handed to launched devices and services
pub const EXEC_DEVICE_MGR_IOR: &str = "DEVICE_MGR_IOR";
pub const EXEC_PROFILE_NAME: &str = "PROFILE_NAME";
pub const EXEC_DEVICE_ID: &str = "DEVICE_ID";
pub const EXEC_DEVICE_LABEL: &str = "DEVICE_LABEL";
pub const EXEC_COMPOSITE_DEVICE_IOR: &str = "COMPOSITE_DEVICE_IOR";
pub const EXEC_IDM_CHANNEL_IOR: &str = "IDM_CHANNEL_IOR";
pub const EXEC_SERVICE_NAME: &str = "SERVICE_NAME";
pub const EXEC_LOGGING_CONFIG_URI: &str = "LOGGING_CONFIG_URI";
pub const EXEC_DEBUG_LEVEL: &str = "DEBUG_LEVEL";
pub const EXEC_DOM_PATH: &str = "DOM_PATH";

/// Instance property that overrides the log level of a launched component
pub const PROP_LOG_LEVEL: &str = "LOG_LEVEL";

// Allocation properties checked by architecture matching
pub const PROP_PROCESSOR_NAME: &str = "DCE:fefb9c66-d14a-438d-ad59-2cfd1adb272b";
pub const PROP_OS_NAME: &str = "DCE:4a23ad60-0b25-4121-a630-68803a498f75";
pub const PROP_OS_VERSION: &str = "DCE:0f3a9a37-a342-43d8-9b7f-78dc6da74192";

// Domain object types understood by `lookup_domain_object`
pub const FINDER_EVENT_CHANNEL: &str = "eventchannel";
pub const FINDER_SERVICE_NAME: &str = "servicename";
pub const FINDER_SERVICE_TYPE: &str = "servicetype";
pub const FINDER_DOMAIN_MANAGER: &str = "domainmanager";
pub const FINDER_APPLICATION: &str = "application";

/// Channel used when an event-channel finder carries no name
pub const DEFAULT_EVENT_CHANNEL: &str = "IDM_Channel";
/// Outgoing domain channel carrying object added/removed events
pub const ODM_CHANNEL: &str = "ODM_Channel";

// Timings
pub const CONNECT_PORT_TIMEOUT: Duration = Duration::from_secs(2);
pub const GET_PORT_TIMEOUT: Duration = Duration::from_secs(2);
pub const DISCONNECT_PORT_TIMEOUT: Duration = Duration::from_millis(500);
pub const EVENT_PUBLISH_TIMEOUT: Duration = Duration::from_millis(500);
pub const RELEASE_DEVICE_TIMEOUT: Duration = Duration::from_secs(3);
pub const SERVICE_TERMINATE_GRACE: Duration = Duration::from_millis(500);
pub const DEVICE_TERMINATE_GRACE: Duration = Duration::from_millis(500);
pub const SIGKILL_REAP_TIMEOUT: Duration = Duration::from_secs(1);
pub const PROCESS_POLL_INTERVAL: Duration = Duration::from_millis(50);
pub const DOMAIN_RESOLVE_RETRY: Duration = Duration::from_millis(500);
pub const REGISTRATION_RETRY_DELAY: Duration = Duration::from_secs(1);
pub const COMPOSITE_PARENT_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const COMPOSITE_PARENT_POLL_ATTEMPTS: u32 = 50;
