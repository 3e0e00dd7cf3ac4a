//! Connection endpoints
//! One side of a connection. Resolves lazily to a live object and can be
//! released so a later registration re-resolves a different instance.

use crate::domain::constants::{
    DEFAULT_EVENT_CHANNEL, FINDER_APPLICATION, FINDER_EVENT_CHANNEL, FINDER_SERVICE_NAME,
    GET_PORT_TIMEOUT,
};
use crate::domain::entities::connection_descriptor::{
    FindBy, PortSupplierRef, ProvidesDescriptor, UsesPortDescriptor,
};
use crate::domain::ports::{ConnectionManager, ObjectBroker, ObjectRef};
use crate::domain::value_objects::DependencyType;
use crate::domain::RemoteError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, warn};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Clone)]
pub enum EndpointTarget {
    /// An application, by identifier. Applications are created, never waited for.
    Application { identifier: String },
    /// A component or device, by instantiation identifier
    Component { identifier: String },
    DeviceLoaded { component_id: String },
    DeviceUsed { component_id: String, uses_id: String },
    ApplicationUsesDevice { uses_id: String },
    FindByNamingService { name: String },
    FindByDomainFinder { kind: String, name: String },
    Service { name: String },
    EventChannel { name: String },
    Objectref { object: ObjectRef },
    Port {
        supplier: Box<Endpoint>,
        name: String,
        invalid_port: bool,
    },
}

#[derive(Clone)]
pub struct Endpoint {
    target: EndpointTarget,
    object: Option<ObjectRef>,
}

impl Endpoint {
    pub fn new(target: EndpointTarget) -> Self {
        Self {
            target,
            object: None,
        }
    }

    pub fn application(identifier: impl Into<String>) -> Self {
        Self::new(EndpointTarget::Application {
            identifier: identifier.into(),
        })
    }

    pub fn component(identifier: impl Into<String>) -> Self {
        Self::new(EndpointTarget::Component {
            identifier: identifier.into(),
        })
    }

    pub fn service(name: impl Into<String>) -> Self {
        Self::new(EndpointTarget::Service { name: name.into() })
    }

    pub fn event_channel(name: impl Into<String>) -> Self {
        Self::new(EndpointTarget::EventChannel { name: name.into() })
    }

    pub fn naming_service(name: impl Into<String>) -> Self {
        Self::new(EndpointTarget::FindByNamingService { name: name.into() })
    }

    pub fn object(object: ObjectRef) -> Self {
        Self::new(EndpointTarget::Objectref { object })
    }

    /// The named port of whatever this endpoint resolves to
    pub fn port(self, name: impl Into<String>) -> Self {
        Self::new(EndpointTarget::Port {
            supplier: Box::new(self),
            name: name.into(),
            invalid_port: false,
        })
    }

    pub fn from_find_by(find_by: &FindBy) -> Self {
        match find_by {
            FindBy::NamingService(name) => Self::naming_service(name.clone()),
            FindBy::DomainFinder { kind, name } => match kind.as_str() {
                FINDER_SERVICE_NAME => Self::service(name.clone()),
                FINDER_EVENT_CHANNEL => Self::event_channel(name.clone()),
                _ => Self::new(EndpointTarget::FindByDomainFinder {
                    kind: kind.clone(),
                    name: name.clone(),
                }),
            },
        }
    }

    pub fn from_supplier(supplier: &PortSupplierRef) -> Self {
        match supplier {
            PortSupplierRef::ComponentInstantiationRef(id) => Self::component(id.clone()),
            PortSupplierRef::FindBy(find_by) => Self::from_find_by(find_by),
            PortSupplierRef::DeviceThatLoaded(id) => Self::new(EndpointTarget::DeviceLoaded {
                component_id: id.clone(),
            }),
            PortSupplierRef::DeviceUsedBy { refid, usesrefid } => {
                Self::new(EndpointTarget::DeviceUsed {
                    component_id: refid.clone(),
                    uses_id: usesrefid.clone(),
                })
            }
            PortSupplierRef::ApplicationUsesDevice(uses_id) => {
                Self::new(EndpointTarget::ApplicationUsesDevice {
                    uses_id: uses_id.clone(),
                })
            }
        }
    }

    pub fn from_uses(descriptor: &UsesPortDescriptor) -> Self {
        Self::from_supplier(&descriptor.supplier).port(descriptor.port_name.clone())
    }

    pub fn from_provides(descriptor: &ProvidesDescriptor) -> Self {
        match descriptor {
            ProvidesDescriptor::Port {
                port_name,
                supplier,
            } => Self::from_supplier(supplier).port(port_name.clone()),
            ProvidesDescriptor::ComponentSupportedInterface { supplier, .. } => {
                Self::from_supplier(supplier)
            }
            ProvidesDescriptor::FindBy(find_by) => Self::from_find_by(find_by),
        }
    }

    pub fn target(&self) -> &EndpointTarget {
        &self.target
    }

    /// The object from the last successful resolve
    pub fn cached(&self) -> Option<&ObjectRef> {
        self.object.as_ref()
    }

    pub fn is_resolved(&self) -> bool {
        self.object.is_some()
    }

    /// Resolve to a live object, using the cached one when present.
    /// A target that cannot be found yields `None`, never an error.
    pub fn resolve<'a>(
        &'a mut self,
        manager: &'a dyn ConnectionManager,
    ) -> BoxFuture<'a, Option<ObjectRef>> {
        Box::pin(async move {
            if let Some(object) = &self.object {
                return Some(object.clone());
            }

            let resolved = match &mut self.target {
                EndpointTarget::Application { identifier } => {
                    domain_object(manager, FINDER_APPLICATION, identifier).await
                }
                EndpointTarget::Component { identifier } => {
                    manager.resolve_component(identifier).await
                }
                EndpointTarget::DeviceLoaded { component_id } => {
                    manager.resolve_device_that_loaded(component_id).await
                }
                EndpointTarget::DeviceUsed {
                    component_id,
                    uses_id,
                } => {
                    manager
                        .resolve_device_used_by_component(component_id, uses_id)
                        .await
                }
                EndpointTarget::ApplicationUsesDevice { uses_id } => {
                    manager.resolve_device_used_by_application(uses_id).await
                }
                EndpointTarget::FindByNamingService { name } => {
                    manager.resolve_find_by_naming_service(name).await
                }
                EndpointTarget::FindByDomainFinder { kind, name } => {
                    domain_object(manager, kind, name).await
                }
                EndpointTarget::Service { name } => {
                    domain_object(manager, FINDER_SERVICE_NAME, name).await
                }
                EndpointTarget::EventChannel { name } => {
                    domain_object(manager, FINDER_EVENT_CHANNEL, name).await
                }
                EndpointTarget::Objectref { object } => Some(object.clone()),
                EndpointTarget::Port {
                    supplier,
                    name,
                    invalid_port,
                } => {
                    let supplier = supplier.resolve(manager).await?;
                    let Some(port_supplier) = supplier.as_port_supplier() else {
                        warn!(port = %name, "Port supplier does not provide ports");
                        return None;
                    };
                    match tokio::time::timeout(GET_PORT_TIMEOUT, port_supplier.get_port(name)).await {
                        Ok(Ok(port)) => Some(port),
                        Ok(Err(RemoteError::UnknownPort(_))) => {
                            warn!(port = %name, "Supplier has no such port");
                            *invalid_port = true;
                            None
                        }
                        Ok(Err(e)) => {
                            debug!(port = %name, error = %e, "Unable to get port");
                            None
                        }
                        Err(_) => {
                            warn!(port = %name, "Timed out getting port");
                            None
                        }
                    }
                }
            };

            self.object = resolved.clone();
            resolved
        })
    }

    /// Forget the cached object
    pub fn release(&mut self) {
        self.object = None;
        if let EndpointTarget::Port {
            supplier,
            invalid_port,
            ..
        } = &mut self.target
        {
            supplier.release();
            *invalid_port = false;
        }
    }

    /// Whether absence of the target is tolerated until something registers
    pub fn allow_deferral(&self) -> bool {
        match &self.target {
            EndpointTarget::Application { .. } => false,
            EndpointTarget::Component { .. } => true,
            EndpointTarget::DeviceLoaded { .. }
            | EndpointTarget::DeviceUsed { .. }
            | EndpointTarget::ApplicationUsesDevice { .. }
            | EndpointTarget::FindByNamingService { .. }
            | EndpointTarget::Objectref { .. } => false,
            EndpointTarget::FindByDomainFinder { .. }
            | EndpointTarget::Service { .. }
            | EndpointTarget::EventChannel { .. } => true,
            EndpointTarget::Port {
                supplier,
                invalid_port,
                ..
            } => !invalid_port && supplier.allow_deferral(),
        }
    }

    pub fn check_dependency(&self, kind: DependencyType, identifier: &str) -> bool {
        match &self.target {
            EndpointTarget::Application { identifier: id } => {
                kind == DependencyType::Application && id == identifier
            }
            EndpointTarget::Component { identifier: id } => {
                kind == DependencyType::Component && id == identifier
            }
            EndpointTarget::FindByDomainFinder { name, .. } | EndpointTarget::Service { name } => {
                kind == DependencyType::ServiceName && name == identifier
            }
            EndpointTarget::Port { supplier, .. } => supplier.check_dependency(kind, identifier),
            _ => false,
        }
    }

    /// Channel whose connection count this endpoint holds, if it is an event channel
    pub fn event_channel_name(&self) -> Option<&str> {
        let name = match &self.target {
            EndpointTarget::EventChannel { name } => name,
            EndpointTarget::FindByDomainFinder { kind, name } if kind == FINDER_EVENT_CHANNEL => {
                name
            }
            _ => return None,
        };
        Some(if name.is_empty() {
            DEFAULT_EVENT_CHANNEL
        } else {
            name.as_str()
        })
    }

    pub fn to_record(&self) -> EndpointRecord {
        let target = match &self.target {
            EndpointTarget::Application { identifier } => TargetRecord::Application {
                identifier: identifier.clone(),
            },
            EndpointTarget::Component { identifier } => TargetRecord::Component {
                identifier: identifier.clone(),
            },
            EndpointTarget::DeviceLoaded { component_id } => TargetRecord::DeviceLoaded {
                component_id: component_id.clone(),
            },
            EndpointTarget::DeviceUsed {
                component_id,
                uses_id,
            } => TargetRecord::DeviceUsed {
                component_id: component_id.clone(),
                uses_id: uses_id.clone(),
            },
            EndpointTarget::ApplicationUsesDevice { uses_id } => {
                TargetRecord::ApplicationUsesDevice {
                    uses_id: uses_id.clone(),
                }
            }
            EndpointTarget::FindByNamingService { name } => {
                TargetRecord::FindByNamingService { name: name.clone() }
            }
            EndpointTarget::FindByDomainFinder { kind, name } => {
                TargetRecord::FindByDomainFinder {
                    kind: kind.clone(),
                    name: name.clone(),
                }
            }
            EndpointTarget::Service { name } => TargetRecord::Service { name: name.clone() },
            EndpointTarget::EventChannel { name } => {
                TargetRecord::EventChannel { name: name.clone() }
            }
            EndpointTarget::Objectref { object } => TargetRecord::Objectref { ior: object.ior() },
            EndpointTarget::Port { supplier, name, .. } => TargetRecord::Port {
                supplier: Box::new(supplier.to_record()),
                name: name.clone(),
            },
        };
        EndpointRecord {
            target,
            ior: self.object.as_ref().map(|o| o.ior()),
        }
    }

    /// Rebuild from a persisted record. `None` if a literal object reference is gone.
    pub fn from_record(record: &EndpointRecord, broker: &dyn ObjectBroker) -> Option<Self> {
        let target = match &record.target {
            TargetRecord::Application { identifier } => EndpointTarget::Application {
                identifier: identifier.clone(),
            },
            TargetRecord::Component { identifier } => EndpointTarget::Component {
                identifier: identifier.clone(),
            },
            TargetRecord::DeviceLoaded { component_id } => EndpointTarget::DeviceLoaded {
                component_id: component_id.clone(),
            },
            TargetRecord::DeviceUsed {
                component_id,
                uses_id,
            } => EndpointTarget::DeviceUsed {
                component_id: component_id.clone(),
                uses_id: uses_id.clone(),
            },
            TargetRecord::ApplicationUsesDevice { uses_id } => {
                EndpointTarget::ApplicationUsesDevice {
                    uses_id: uses_id.clone(),
                }
            }
            TargetRecord::FindByNamingService { name } => {
                EndpointTarget::FindByNamingService { name: name.clone() }
            }
            TargetRecord::FindByDomainFinder { kind, name } => {
                EndpointTarget::FindByDomainFinder {
                    kind: kind.clone(),
                    name: name.clone(),
                }
            }
            TargetRecord::Service { name } => EndpointTarget::Service { name: name.clone() },
            TargetRecord::EventChannel { name } => {
                EndpointTarget::EventChannel { name: name.clone() }
            }
            TargetRecord::Objectref { ior } => EndpointTarget::Objectref {
                object: broker.object(ior)?,
            },
            TargetRecord::Port { supplier, name } => EndpointTarget::Port {
                supplier: Box::new(Endpoint::from_record(supplier, broker)?),
                name: name.clone(),
                invalid_port: false,
            },
        };
        Some(Self {
            target,
            object: record.ior.as_deref().and_then(|ior| broker.object(ior)),
        })
    }
}

async fn domain_object(
    manager: &dyn ConnectionManager,
    kind: &str,
    name: &str,
) -> Option<ObjectRef> {
    match manager.resolve_domain_object(kind, name).await {
        Ok(object) => object,
        Err(e) => {
            debug!(kind = %kind, name = %name, error = %e, "Domain object lookup failed");
            None
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            EndpointTarget::Application { identifier } => write!(f, "application {identifier}"),
            EndpointTarget::Component { identifier } => write!(f, "component {identifier}"),
            EndpointTarget::DeviceLoaded { component_id } => {
                write!(f, "device that loaded {component_id}")
            }
            EndpointTarget::DeviceUsed {
                component_id,
                uses_id,
            } => write!(f, "device {uses_id} used by {component_id}"),
            EndpointTarget::ApplicationUsesDevice { uses_id } => {
                write!(f, "application device {uses_id}")
            }
            EndpointTarget::FindByNamingService { name } => write!(f, "naming service {name}"),
            EndpointTarget::FindByDomainFinder { kind, name } => write!(f, "{kind} {name}"),
            EndpointTarget::Service { name } => write!(f, "service {name}"),
            EndpointTarget::EventChannel { name } => write!(f, "event channel {name}"),
            EndpointTarget::Objectref { object } => write!(f, "object {}", object.ior()),
            EndpointTarget::Port { supplier, name, .. } => write!(f, "port {name} of {supplier}"),
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("target", &self.to_string())
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "endpoint", rename_all = "snake_case")]
pub enum TargetRecord {
    Application { identifier: String },
    Component { identifier: String },
    DeviceLoaded { component_id: String },
    DeviceUsed { component_id: String, uses_id: String },
    ApplicationUsesDevice { uses_id: String },
    FindByNamingService { name: String },
    FindByDomainFinder { kind: String, name: String },
    Service { name: String },
    EventChannel { name: String },
    Objectref { ior: String },
    Port { supplier: Box<EndpointRecord>, name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointRecord {
    pub target: TargetRecord,
    #[serde(default)]
    pub ior: Option<String>,
}
