use glue_types::{Namespace, Service, ServiceGroup};
use heck::{ToKebabCase, ToLowerCamelCase, ToUpperCamelCase};

/* Package of a namespace: the bare layer name for layer roots, otherwise
   "<layer>-<namespace>" */
pub fn namespace_package(ns: &Namespace) -> String {
  if ns.is_layer_root() {
    ns.layer.name().to_string()
  } else {
    format!("{}-{}", ns.layer.name(), ns.name.to_kebab_case())
  }
}

pub fn service_package(ns: &Namespace, svc: &Service) -> String {
  format!("{}-{}", namespace_package(ns), svc.name.to_kebab_case())
}

pub fn group_package(ns: &Namespace, group: &ServiceGroup) -> String {
  format!("{}-{}", namespace_package(ns), group.name.to_kebab_case())
}

/* Class / interface name of a schema definition */
pub fn type_name(name: &str) -> String {
  name.to_upper_camel_case()
}

/* Property and method names */
pub fn member_name(name: &str) -> String {
  name.to_lower_camel_case()
}

/* "HostService" for service "service" of namespace "host" */
pub fn service_name(ns: &Namespace, svc: &Service) -> String {
  format!("{}{}", type_name(&ns.name), type_name(&svc.name))
}

/* Module alias under which a namespace's exports are imported */
pub fn namespace_alias(id: u16) -> String {
  format!("_ns_{}", id)
}

#[cfg(test)]
mod tests {
  use super::*;
  use glue_types::{Layer, Type};

  #[test]
  fn test_namespace_packages() {
    let core = Namespace::new(64, "core", Layer::Core);
    let host = Namespace::new(30001, "host", Layer::Svc);
    let wrapper = Namespace::new(20003, "dbWrapper", Layer::Infra);
    assert_eq!(namespace_package(&core), "core");
    assert_eq!(namespace_package(&host), "svc-host");
    assert_eq!(namespace_package(&wrapper), "infra-db-wrapper");

    let svc = Service {
      id: 0,
      name: "service".to_string(),
      config: Type::Empty,
      methods: Default::default(),
      requires: Vec::new(),
    };
    assert_eq!(service_package(&host, &svc), "svc-host-service");
    assert_eq!(service_name(&host, &svc), "HostService");
  }

  #[test]
  fn test_identifier_casing() {
    assert_eq!(type_name("logLevel"), "LogLevel");
    assert_eq!(type_name("rpc_request"), "RpcRequest");
    assert_eq!(member_name("unhandledException"), "unhandledException");
    assert_eq!(member_name("Ping"), "ping");
  }
}
