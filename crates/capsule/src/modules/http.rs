//! HTTP server stub. Servers never bind; `listen` only announces itself.

use std::sync::Arc;

use rquickjs::function::{Opt, This};
use rquickjs::{Ctx, Function, Object, Value};

use super::{BuiltinModule, ModuleEnv};
use crate::sandbox::{OutputLevel, OutputSink, convert};

/// The `http` module.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpModule;

impl BuiltinModule for HttpModule {
    fn name(&self) -> &'static str {
        "http"
    }

    fn methods(&self) -> &'static [&'static str] {
        &["createServer"]
    }

    fn instantiate<'js>(&self, ctx: &Ctx<'js>, env: &ModuleEnv) -> rquickjs::Result<Object<'js>> {
        let http = Object::new(ctx.clone())?;
        let sink = Arc::clone(&env.sink);
        let create_server = Function::new(ctx.clone(), move |ctx: Ctx<'js>, _listener: Opt<Value<'js>>| {
            server(&ctx, &sink)
        })?;
        http.set("createServer", create_server.with_name("createServer")?)?;
        Ok(http)
    }
}

fn server<'js>(ctx: &Ctx<'js>, sink: &Arc<dyn OutputSink>) -> rquickjs::Result<Object<'js>> {
    let server = Object::new(ctx.clone())?;

    // listen(port, host?, callback?); a function in place of the host is the
    // callback.
    let sink = Arc::clone(sink);
    let listen = Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>,
              this: This<Value<'js>>,
              port: Opt<Value<'js>>,
              host: Opt<Value<'js>>,
              callback: Opt<Value<'js>>|
              -> rquickjs::Result<Value<'js>> {
            let (host, callback) = match host.0 {
                Some(host) if host.is_function() => (None, Some(host)),
                Some(host) if !host.is_undefined() && !host.is_null() => (Some(host), callback.0),
                _ => (None, callback.0),
            };
            let host = match host {
                Some(host) => convert::display(&ctx, host)?,
                None => "localhost".to_string(),
            };
            let port = match port.0 {
                Some(port) => convert::display(&ctx, port)?,
                None => "undefined".to_string(),
            };
            sink.emit(OutputLevel::Info, &format!("Server running at http://{}:{}/", host, port));

            if let Some(callback) = callback.and_then(|c| c.into_function()) {
                let _: Value<'js> = callback.call(())?;
            }
            Ok(this.0)
        },
    )?;
    server.set("listen", listen.with_name("listen")?)?;

    let on = Function::new(
        ctx.clone(),
        |this: This<Value<'js>>, _event: Opt<Value<'js>>, _listener: Opt<Value<'js>>| this.0,
    )?;
    server.set("on", on.with_name("on")?)?;

    Ok(server)
}
