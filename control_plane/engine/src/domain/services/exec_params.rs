//! Exec parameters
//! The key/value argument list handed to a launched device or service.

use crate::domain::constants::{
    EXEC_COMPOSITE_DEVICE_IOR, EXEC_DEBUG_LEVEL, EXEC_DEVICE_ID, EXEC_DEVICE_LABEL,
    EXEC_DEVICE_MGR_IOR, EXEC_DOM_PATH, EXEC_IDM_CHANNEL_IOR, EXEC_LOGGING_CONFIG_URI,
    EXEC_PROFILE_NAME, EXEC_SERVICE_NAME,
};
use crate::domain::entities::{ComponentInstantiation, Properties};
use std::collections::BTreeMap;
use tracing::{trace, warn};

/// Everything the parameter list is built from
#[derive(Debug, Clone)]
pub struct ExecContext<'a> {
    pub device_manager_ior: &'a str,
    /// Profile path of the placed component
    pub profile: &'a str,
    pub instantiation: &'a ComponentInstantiation,
    pub is_service: bool,
    /// Present only for members of a composite device
    pub composite_device_ior: Option<&'a str>,
    pub event_channel_ior: Option<&'a str>,
    /// Node-wide logging configuration, used when the instance names none
    pub logging_config_uri: Option<&'a str>,
    pub debug_level: u8,
    /// `<domain>/<device manager label>`
    pub dom_path: &'a str,
    /// Merged property file of the component
    pub properties: &'a Properties,
}

/// Numeric debug level for a log level name, FATAL 0 through TRACE 5
pub fn debug_level_for(level: &str) -> Option<u8> {
    match level.trim().to_uppercase().as_str() {
        "FATAL" | "OFF" => Some(0),
        "ERROR" => Some(1),
        "WARN" | "WARNING" => Some(2),
        "INFO" => Some(3),
        "DEBUG" => Some(4),
        "TRACE" | "ALL" => Some(5),
        other => other.parse::<u8>().ok().filter(|l| *l <= 5),
    }
}

pub fn build_exec_params(ctx: &ExecContext<'_>) -> Vec<(String, String)> {
    let instantiation = ctx.instantiation;
    let mut params = vec![(EXEC_DEVICE_MGR_IOR.to_string(), ctx.device_manager_ior.to_string())];

    if ctx.is_service {
        params.push((EXEC_SERVICE_NAME.to_string(), instantiation.usage_name.clone()));
    } else {
        params.push((EXEC_PROFILE_NAME.to_string(), ctx.profile.to_string()));
        params.push((EXEC_DEVICE_ID.to_string(), instantiation.id.clone()));
        params.push((EXEC_DEVICE_LABEL.to_string(), instantiation.usage_name.clone()));
        if let Some(ior) = ctx.composite_device_ior {
            params.push((EXEC_COMPOSITE_DEVICE_IOR.to_string(), ior.to_string()));
        }
        if let Some(ior) = ctx.event_channel_ior {
            params.push((EXEC_IDM_CHANNEL_IOR.to_string(), ior.to_string()));
        }
    }

    let logging_uri = instantiation
        .override_for(EXEC_LOGGING_CONFIG_URI)
        .and_then(|v| v.to_exec_string())
        .or_else(|| instantiation.logging_config.clone())
        .or_else(|| ctx.logging_config_uri.map(str::to_string))
        .filter(|uri| !uri.is_empty());
    match logging_uri {
        Some(uri) => params.push((EXEC_LOGGING_CONFIG_URI.to_string(), uri)),
        None => {
            let level = instantiation
                .log_level
                .as_deref()
                .and_then(debug_level_for)
                .unwrap_or(ctx.debug_level);
            params.push((EXEC_DEBUG_LEVEL.to_string(), level.to_string()));
        }
    }

    params.push((EXEC_DOM_PATH.to_string(), ctx.dom_path.to_string()));
    params.extend(overloaded_exec_params(ctx.properties, instantiation));
    params
}

/// Exec-param properties with their defaults, overridden by the instance
/// where the property is writable. Ordered by property id.
fn overloaded_exec_params(
    properties: &Properties,
    instantiation: &ComponentInstantiation,
) -> BTreeMap<String, String> {
    let mut overloaded = BTreeMap::new();
    for def in properties.exec_param_properties() {
        if !def.is_simple() {
            warn!(property = %def.id, "Exec parameters must be simple properties");
            continue;
        }
        match def.value.to_exec_string() {
            Some(value) => {
                overloaded.insert(def.id.clone(), value);
            }
            None => trace!(property = %def.id, "Exec parameter has no default"),
        }

        let Some(value) = instantiation.override_for(&def.id) else {
            continue;
        };
        if def.is_readonly() {
            warn!(property = %def.id, "Ignoring override of readonly exec parameter");
            continue;
        }
        match value.to_exec_string() {
            Some(value) => {
                overloaded.insert(def.id.clone(), value);
            }
            None => warn!(property = %def.id, "Override has no value"),
        }
    }
    overloaded
}

/// Flatten into command-line arguments
pub fn to_argv(params: &[(String, String)]) -> Vec<String> {
    params
        .iter()
        .flat_map(|(key, value)| [key.clone(), value.clone()])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{AccessMode, PropertyDef, PropertyKind, PropertyShape};
    use crate::domain::value_objects::{Action, DataType, PropertyValue, SimpleType};

    fn instantiation() -> ComponentInstantiation {
        ComponentInstantiation {
            id: "DCE:gpp-1".to_string(),
            usage_name: "GPP_1".to_string(),
            overrides: Vec::new(),
            device_requires: Vec::new(),
            logging_config: None,
            log_level: None,
        }
    }

    fn exec_param(id: &str, value: PropertyValue, mode: AccessMode) -> PropertyDef {
        PropertyDef {
            id: id.to_string(),
            name: None,
            value_type: SimpleType::String,
            shape: PropertyShape::Simple,
            kinds: vec![PropertyKind::ExecParam],
            mode,
            action: Action::Eq,
            value,
        }
    }

    fn context<'a>(
        instantiation: &'a ComponentInstantiation,
        properties: &'a Properties,
    ) -> ExecContext<'a> {
        ExecContext {
            device_manager_ior: "IOR:devmgr",
            profile: "/devices/GPP/GPP.spd.yaml",
            instantiation,
            is_service: false,
            composite_device_ior: None,
            event_channel_ior: Some("IOR:idm"),
            logging_config_uri: None,
            debug_level: 3,
            dom_path: "REDHAWK_DEV/DevMgr_host",
            properties,
        }
    }

    fn keys(params: &[(String, String)]) -> Vec<&str> {
        params.iter().map(|(k, _)| k.as_str()).collect()
    }

    #[test]
    fn test_device_parameters_in_order() {
        let inst = instantiation();
        let props = Properties::default();
        let params = build_exec_params(&context(&inst, &props));

        assert_eq!(
            keys(&params),
            vec![
                "DEVICE_MGR_IOR",
                "PROFILE_NAME",
                "DEVICE_ID",
                "DEVICE_LABEL",
                "IDM_CHANNEL_IOR",
                "DEBUG_LEVEL",
                "DOM_PATH"
            ]
        );
        assert_eq!(params[5].1, "3");
    }

    #[test]
    fn test_logging_uri_replaces_debug_level() {
        let mut inst = instantiation();
        inst.logging_config = Some("file:///etc/log.cfg".to_string());
        let props = Properties::default();
        let params = build_exec_params(&context(&inst, &props));

        assert!(keys(&params).contains(&"LOGGING_CONFIG_URI"));
        assert!(!keys(&params).contains(&"DEBUG_LEVEL"));
    }

    #[test]
    fn test_instance_log_level_overrides_inherited_level() {
        let mut inst = instantiation();
        inst.log_level = Some("TRACE".to_string());
        let props = Properties::default();
        let params = build_exec_params(&context(&inst, &props));

        let level = params.iter().find(|(k, _)| k == "DEBUG_LEVEL").unwrap();
        assert_eq!(level.1, "5");
    }

    #[test]
    fn test_service_parameters() {
        let inst = instantiation();
        let props = Properties::default();
        let mut ctx = context(&inst, &props);
        ctx.is_service = true;
        let params = build_exec_params(&ctx);

        assert_eq!(
            keys(&params),
            vec!["DEVICE_MGR_IOR", "SERVICE_NAME", "DEBUG_LEVEL", "DOM_PATH"]
        );
    }

    #[test]
    fn test_readonly_exec_params_keep_their_default() {
        let mut inst = instantiation();
        inst.overrides = vec![
            DataType::new("serial", "override"),
            DataType::new("mode", "fast"),
        ];
        let props = Properties {
            properties: vec![
                exec_param("serial", "factory".into(), AccessMode::ReadOnly),
                exec_param("mode", "slow".into(), AccessMode::ReadWrite),
                exec_param("unset", PropertyValue::Nil, AccessMode::ReadWrite),
            ],
        };
        let params = build_exec_params(&context(&inst, &props));
        let tail: Vec<(String, String)> = params[7..].to_vec();

        assert_eq!(
            tail,
            vec![
                ("mode".to_string(), "fast".to_string()),
                ("serial".to_string(), "factory".to_string()),
            ]
        );
    }

    #[test]
    fn test_debug_level_names() {
        assert_eq!(debug_level_for("fatal"), Some(0));
        assert_eq!(debug_level_for("WARN"), Some(2));
        assert_eq!(debug_level_for("4"), Some(4));
        assert_eq!(debug_level_for("9"), None);
        assert_eq!(debug_level_for("loud"), None);
    }

    #[test]
    fn test_argv_flattens_pairs() {
        let argv = to_argv(&[("A".to_string(), "1".to_string()), ("B".to_string(), "2".to_string())]);
        assert_eq!(argv, vec!["A", "1", "B", "2"]);
    }
}
