//! Standard root namespaces.
//!
//! Implicit dependency edges target the root namespace of every lower layer
//! and the runtime roots for RPC and DB access. `standard()` declares all of
//! them, together with the RPC envelope types the generated clients and
//! servers exchange.

use crate::builder::SchemaBuilder;
use crate::error::SchemaResult;
use crate::layer::Layer;
use crate::types::Type;

pub const RPC_SERVER: &str = "rpcserver";
pub const RPC_CLIENT: &str = "rpcclient";
pub const DB_WRAPPER: &str = "dbwrapper";

pub const CORE_ID: u32 = 64;
pub const INFRA_ID: u32 = 20000;
pub const RPC_SERVER_ID: u32 = 20001;
pub const RPC_CLIENT_ID: u32 = 20002;
pub const DB_WRAPPER_ID: u32 = 20003;
pub const SVC_ID: u32 = 30000;
pub const BIZ_ID: u32 = 40000;
pub const APP_ID: u32 = 50000;
pub const DEPLOY_ID: u32 = 60000;

/// Builder seeded with every standard root namespace.
pub fn standard() -> SchemaResult<SchemaBuilder> {
    SchemaBuilder::new()
        .namespace(CORE_ID, Layer::Core.name(), Layer::Core, |ns| {
            ns.variant(0, "logLevel", |v| {
                v.value(0, "debug")?
                    .value(1, "info")?
                    .value(2, "warn")?
                    .value(3, "error")
            })?
            .record(1, "empty", Ok)
        })?
        .namespace(INFRA_ID, Layer::Infra.name(), Layer::Infra, |ns| {
            ns.record(0, "rpcError", |r| r.field(0, "message", Type::Str))?
                .variant(1, "rpcResult", |v| {
                    v.value_with(0, "ok", Type::Any)?
                        .value_with(1, "unhandledException", Type::named("rpcError"))?
                        .value(2, "noSuchService")?
                        .value(3, "noSuchMethod")
                })?
                .record(2, "rpcRequest", |r| {
                    r.field(0, "version", Type::Int32)?
                        .field(1, "requestId", Type::Str)?
                        .field(2, "namespaceId", Type::Int32)?
                        .field(3, "serviceId", Type::Int32)?
                        .field(4, "methodId", Type::Int32)?
                        .field(5, "params", Type::Any)
                })?
                .record(3, "rpcResponse", |r| {
                    r.field(0, "version", Type::Int32)?
                        .field(1, "requestId", Type::Str)?
                        .field(2, "result", Type::named("rpcResult"))
                })
        })?
        .namespace(RPC_SERVER_ID, RPC_SERVER, Layer::Infra, Ok)?
        .namespace(RPC_CLIENT_ID, RPC_CLIENT, Layer::Infra, Ok)?
        .namespace(DB_WRAPPER_ID, DB_WRAPPER, Layer::Infra, Ok)?
        .namespace(SVC_ID, Layer::Svc.name(), Layer::Svc, Ok)?
        .namespace(BIZ_ID, Layer::Biz.name(), Layer::Biz, Ok)?
        .namespace(APP_ID, Layer::App.name(), Layer::App, Ok)?
        .namespace(DEPLOY_ID, Layer::Deploy.name(), Layer::Deploy, Ok)
}
