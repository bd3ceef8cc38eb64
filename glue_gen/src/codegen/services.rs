/* Service lowering: the service interface and client in the namespace
   package, an abstract server base per service package, and the bundled
   entrypoint of a service group.

   Clients and servers exchange the envelope described by the infra root:
   `_request` sends (namespace, service, method, params) and resolves to the
   `ok` payload; `_dispatch` returns one arm of the result union. */

use super::emitter::Emitter;
use super::naming::{member_name, namespace_alias, service_name};
use super::typescript::Scope;
use crate::error::BuildResult;
use glue_types::{Namespace, Service, qualified_name};

pub fn emit_client(e: &mut Emitter, scope: &Scope, ns: &Namespace, svc: &Service, client_base: &str) -> BuildResult<()> {
  let name = service_name(ns, svc);

  e.open(format!("export interface {} {{", name));
  for method in svc.methods.values() {
    e.line(format!(
      "{}(p: {}): Promise<{}>",
      member_name(&method.name),
      scope.class_type(&method.params)?,
      scope.class_type(&method.returns)?
    ));
  }
  e.close("}").blank();

  e.open(format!(
    "export class {}Client extends {}.ClientBase implements {} {{",
    name, client_base, name
  ));
  e.line(format!("static readonly NS_ID = {}", ns.id));
  e.line(format!("static readonly SERVICE_ID = {}", svc.id));
  for method in svc.methods.values() {
    e.blank();
    e.open(format!(
      "async {}(p: {}): Promise<{}> {{",
      member_name(&method.name),
      scope.class_type(&method.params)?,
      scope.class_type(&method.returns)?
    ))
    .line(format!(
      "const result = await this._request({}Client.NS_ID, {}Client.SERVICE_ID, {}, {})",
      name,
      name,
      method.id,
      scope.serialize(&method.params, "p", 0)?
    ))
    .line(format!("const r = result as {}", scope.wire_type(&method.returns)?))
    .line(format!("return {}", scope.deserialize(&method.returns, "r", 0)?))
    .close("}");
  }
  e.close("}").blank();
  Ok(())
}

/* Result union returned by `_dispatch` */
pub fn emit_outcome_type(e: &mut Emitter) {
  e.line("export type RpcOutcome =");
  e.indent()
    .line("| { ok: unknown }")
    .line("| { unhandledException: { message: string } }")
    .line("| { noSuchService: Record<string, never> }")
    .line("| { noSuchMethod: Record<string, never> }")
    .dedent()
    .blank();
}

/// Abstract server base. Every handler throws until overridden; dispatch
/// maps failures to the matching arm of the result union.
pub fn emit_server(e: &mut Emitter, scope: &Scope, ns: &Namespace, svc: &Service, server_base: &str) -> BuildResult<()> {
  let name = service_name(ns, svc);
  let interface = format!("{}.{}", namespace_alias(ns.id), name);
  let class = format!("{}ServerBase", name);
  let qualified = qualified_name(&ns.name, &svc.name);

  e.open(format!(
    "export abstract class {} extends {}.ServerBase implements {} {{",
    class, server_base, interface
  ));
  e.line(format!("static readonly NS_ID = {}", ns.id));
  e.line(format!("static readonly SERVICE_ID = {}", svc.id));
  e.blank();
  e.open(format!(
    "constructor(readonly config: {}) {{",
    scope.class_type(&svc.config)?
  ))
  .line("super()")
  .close("}");

  for method in svc.methods.values() {
    e.blank();
    e.open(format!(
      "async {}(_p: {}): Promise<{}> {{",
      member_name(&method.name),
      scope.class_type(&method.params)?,
      scope.class_type(&method.returns)?
    ))
    .line(format!(
      "throw new Error(\"{}.{} is not implemented\")",
      qualified, method.name
    ))
    .close("}");
  }

  e.blank();
  e.open("async _dispatch(nsId: number, svcId: number, methodId: number, params: unknown): Promise<RpcOutcome> {");
  e.open(format!(
    "if (nsId !== {}.NS_ID || svcId !== {}.SERVICE_ID) {{",
    class, class
  ))
  .line("return { noSuchService: {} }")
  .close("}");
  e.open("try {");
  e.open("switch (methodId) {");
  for method in svc.methods.values() {
    e.open(format!("case {}: {{", method.id))
      .line(format!("const p = params as {}", scope.wire_type(&method.params)?))
      .line(format!(
        "const r = await this.{}({})",
        member_name(&method.name),
        scope.deserialize(&method.params, "p", 0)?
      ))
      .line(format!("return {{ ok: {} }}", scope.serialize(&method.returns, "r", 0)?))
      .close("}");
  }
  e.open("default:")
    .line("return { noSuchMethod: {} }")
    .dedent();
  e.close("}");
  e.close("} catch (e) {");
  e.indent()
    .line("return { unhandledException: { message: e instanceof Error ? e.message : String(e) } }")
    .close("}");
  e.close("}");
  e.close("}").blank();
  Ok(())
}

/* Hand-owned entrypoint stub of a service package */
pub const ENTRYPOINT_STUB: &str = "export default async function start(): Promise<void> {}\n";

/// Entrypoint of a service group, starting every member service package
/// concurrently. `packages` are scoped package names.
pub fn emit_group_entrypoint(e: &mut Emitter, packages: &[String]) {
  for (i, package) in packages.iter().enumerate() {
    e.line(format!("import {{ start as start{} }} from \"{}\"", i, package));
  }
  if !packages.is_empty() {
    e.blank();
  }
  e.open("export default async function start(): Promise<void> {");
  e.open("await Promise.all([");
  for i in 0..packages.len() {
    e.line(format!("start{}(),", i));
  }
  e.close("])");
  e.close("}");
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::index::{ResolvedSchema, index};
  use glue_types::{Layer, Type, prelude};

  fn resolved() -> ResolvedSchema {
    let schema = prelude::standard()
      .unwrap()
      .namespace(30001, "host", Layer::Svc, |ns| {
        ns.record(0, "config", |r| r.field(0, "port", Type::Int32))?
          .record(1, "status", |r| r.field(0, "up", Type::Bool))?
          .service(0, "service", Type::named("config"), |s| {
            s.method(0, "status", Type::Empty, Type::named("status"))?
              .method(1, "echo", Type::Str, Type::Str)
          })
      })
      .unwrap()
      .build();
    index(&schema).unwrap()
  }

  #[test]
  fn test_client() {
    let resolved = resolved();
    let ns = resolved.schema().namespace(30001).unwrap();
    let scope = Scope::new(&resolved, 30001, false);
    let mut e = Emitter::new("svc-host/codegen.rpcclients.ts");
    emit_client(&mut e, &scope, ns, &ns.services[&0], "_ns_20002").unwrap();
    let out = e.contents();
    assert!(out.contains("export interface HostService {\n\tstatus(p: Record<string, never>): Promise<_ns_30001.Status>\n"));
    assert!(out.contains("export class HostServiceClient extends _ns_20002.ClientBase implements HostService {"));
    assert!(out.contains("this._request(HostServiceClient.NS_ID, HostServiceClient.SERVICE_ID, 1, p)"));
    assert!(out.contains("const r = result as _ns_30001._fields_Status\n\t\treturn new _ns_30001.Status(r)\n"));
  }

  #[test]
  fn test_server_dispatch() {
    let resolved = resolved();
    let ns = resolved.schema().namespace(30001).unwrap();
    let scope = Scope::new(&resolved, 30001, false);
    let mut e = Emitter::new("svc-host-service/codegen.rpcservers.ts");
    emit_outcome_type(&mut e);
    emit_server(&mut e, &scope, ns, &ns.services[&0], "_ns_20001").unwrap();
    let out = e.contents();
    assert!(out.contains(
      "export abstract class HostServiceServerBase extends _ns_20001.ServerBase implements _ns_30001.HostService {"
    ));
    assert!(out.contains("constructor(readonly config: _ns_30001.Config) {"));
    assert!(out.contains("throw new Error(\"host/service.echo is not implemented\")"));
    assert!(out.contains("return { noSuchService: {} }"));
    assert!(out.contains("return { noSuchMethod: {} }"));
    assert!(out.contains("return { ok: r._f }"));
    assert!(out.contains("\t\t} catch (e) {\n\t\t\treturn { unhandledException:"));
  }

  #[test]
  fn test_group_entrypoint() {
    let mut e = Emitter::new("deploy-edge/entrypoint.ts");
    emit_group_entrypoint(&mut e, &["@dev/svc-host-service".to_string(), "@dev/biz-pay-api".to_string()]);
    assert_eq!(
      e.contents(),
      "import { start as start0 } from \"@dev/svc-host-service\"\n\
       import { start as start1 } from \"@dev/biz-pay-api\"\n\
       \n\
       export default async function start(): Promise<void> {\n\
       \tawait Promise.all([\n\
       \t\tstart0(),\n\
       \t\tstart1(),\n\
       \t])\n\
       }\n"
    );
  }
}
