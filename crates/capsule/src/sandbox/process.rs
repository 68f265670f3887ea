//! The emulated `process` object.

use std::sync::Arc;

use rquickjs::function::Opt;
use rquickjs::{Ctx, Function, Object, Value};

use super::convert;
use super::output::{OutputLevel, OutputSink};
use crate::config::SandboxConfig;

pub(crate) fn install<'js>(
    ctx: &Ctx<'js>,
    config: &SandboxConfig,
    sink: &Arc<dyn OutputSink>,
) -> rquickjs::Result<Object<'js>> {
    let process = Object::new(ctx.clone())?;
    process.set("argv", config.argv.clone())?;

    let env = Object::new(ctx.clone())?;
    for (key, value) in &config.env {
        env.set(key.as_str(), value.as_str())?;
    }
    process.set("env", env)?;

    let cwd = config.cwd.clone();
    process.set("cwd", Function::new(ctx.clone(), move || cwd.clone())?.with_name("cwd")?)?;

    // Never terminates the script; only reports.
    let sink = Arc::clone(sink);
    let exit = Function::new(ctx.clone(), move |ctx: Ctx<'js>, code: Opt<Value<'js>>| {
        let code = match code.0 {
            Some(code) if !code.is_undefined() => convert::display(&ctx, code)?,
            _ => "0".to_string(),
        };
        sink.emit(OutputLevel::Info, &format!("Process exited with code {}", code));
        rquickjs::Result::Ok(())
    })?;
    process.set("exit", exit.with_name("exit")?)?;

    process.set("version", config.version.as_str())?;
    process.set("platform", config.platform.as_str())?;
    Ok(process)
}
