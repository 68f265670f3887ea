//! Allow-listed `lodash` subset: `map`, `filter`, `reduce` over arrays.

use rquickjs::function::{Opt, This};
use rquickjs::{Ctx, Function, Object, Value};

use super::{BuiltinModule, ModuleEnv};

/// Call the array's own method so callbacks see `(item, index, array)`.
fn delegate<'js>(ctx: &Ctx<'js>, method: &'static str) -> rquickjs::Result<Function<'js>> {
    Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, array: Object<'js>, callback: Value<'js>, init: Opt<Value<'js>>| {
            let function: Function<'js> = array.get(method)?;
            if method == "reduce" {
                // Always passes the initial value, even `undefined`.
                let init = init.0.unwrap_or_else(|| Value::new_undefined(ctx.clone()));
                function.call::<_, Value<'js>>((This(array), callback, init))
            } else {
                function.call::<_, Value<'js>>((This(array), callback))
            }
        },
    )?
    .with_name(method)
}

/// The `lodash` module.
#[derive(Debug, Clone, Copy, Default)]
pub struct LodashModule;

impl BuiltinModule for LodashModule {
    fn name(&self) -> &'static str {
        "lodash"
    }

    fn methods(&self) -> &'static [&'static str] {
        &["map", "filter", "reduce"]
    }

    fn instantiate<'js>(&self, ctx: &Ctx<'js>, _env: &ModuleEnv) -> rquickjs::Result<Object<'js>> {
        let lodash = Object::new(ctx.clone())?;
        for method in ["map", "filter", "reduce"] {
            lodash.set(method, delegate(ctx, method)?)?;
        }
        Ok(lodash)
    }
}
