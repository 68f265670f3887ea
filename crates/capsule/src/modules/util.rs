//! `printf`-style formatting and JSON inspection.

use std::sync::LazyLock;

use regex_lite::Regex;
use rquickjs::convert::Coerced;
use rquickjs::function::{Opt, Rest};
use rquickjs::{Ctx, Function, Object, Value};

use super::{BuiltinModule, ModuleEnv};
use crate::sandbox::convert;

#[allow(clippy::expect_used)]
static DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"%[sdj%]").expect("directive pattern is valid"));

/// A substitution directive in a format template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// `%s`: `String(arg)`
    String,
    /// `%d`: `Number(arg)`
    Number,
    /// `%j`: `JSON.stringify(arg)`
    Json,
}

/// Substitute `%s`, `%d` and `%j` in `template` with `render(directive,
/// index)` for consecutive argument indices.
///
/// `%%` is left as written, directives beyond `arg_count` stay verbatim and
/// surplus arguments are ignored.
pub fn format_with<E>(
    template: &str,
    arg_count: usize,
    mut render: impl FnMut(Directive, usize) -> Result<String, E>,
) -> Result<String, E> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    let mut next = 0;
    for m in DIRECTIVE.find_iter(template) {
        out.push_str(&template[last..m.start()]);
        last = m.end();

        let directive = match m.as_str() {
            "%s" => Directive::String,
            "%d" => Directive::Number,
            "%j" => Directive::Json,
            other => {
                out.push_str(other);
                continue;
            }
        };
        if next >= arg_count {
            out.push_str(m.as_str());
            continue;
        }
        out.push_str(&render(directive, next)?);
        next += 1;
    }
    out.push_str(&template[last..]);
    Ok(out)
}

fn render<'js>(ctx: &Ctx<'js>, directive: Directive, arg: Value<'js>) -> rquickjs::Result<String> {
    match directive {
        Directive::String => convert::display(ctx, arg),
        Directive::Number => {
            let number: Function<'js> = ctx.globals().get("Number")?;
            convert::display(ctx, number.call((arg,))?)
        }
        Directive::Json => Ok(convert::stringify(ctx, arg, None)?.unwrap_or_else(|| "undefined".to_string())),
    }
}

/// The `util` module.
#[derive(Debug, Clone, Copy, Default)]
pub struct UtilModule;

impl BuiltinModule for UtilModule {
    fn name(&self) -> &'static str {
        "util"
    }

    fn methods(&self) -> &'static [&'static str] {
        &["format", "inspect"]
    }

    fn instantiate<'js>(&self, ctx: &Ctx<'js>, _env: &ModuleEnv) -> rquickjs::Result<Object<'js>> {
        let util = Object::new(ctx.clone())?;

        let format = Function::new(
            ctx.clone(),
            |ctx: Ctx<'js>, template: Coerced<String>, args: Rest<Value<'js>>| {
                format_with(&template.0, args.0.len(), |directive, i| {
                    render(&ctx, directive, args.0[i].clone())
                })
            },
        )?;
        util.set("format", format.with_name("format")?)?;

        // `depth` is used as the JSON indent; zero or missing means 2.
        let inspect = Function::new(
            ctx.clone(),
            |ctx: Ctx<'js>, value: Value<'js>, options: Opt<Value<'js>>| {
                let depth = match options.0.as_ref().and_then(Value::as_object) {
                    Some(options) => options.get::<_, Option<f64>>("depth")?,
                    None => None,
                };
                let indent = depth.filter(|d| *d >= 1.0).map_or(2, |d| d.min(10.0) as i32);
                rquickjs::Result::Ok(
                    convert::stringify(&ctx, value, Some(indent))?.unwrap_or_else(|| "undefined".to_string()),
                )
            },
        )?;
        util.set("inspect", inspect.with_name("inspect")?)?;

        Ok(util)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::convert::Infallible;

    use super::*;

    fn format(template: &str, args: &[&str]) -> String {
        format_with::<Infallible>(template, args.len(), |directive, i| {
            Ok(match directive {
                Directive::String => args[i].to_string(),
                Directive::Number => format!("n{}", args[i]),
                Directive::Json => format!("\"{}\"", args[i]),
            })
        })
        .unwrap()
    }

    #[test]
    fn test_format_substitutes_in_order() {
        assert_eq!(format("%s is %d (%j)", &["x", "1", "y"]), "x is n1 (\"y\")");
    }

    #[test]
    fn test_format_keeps_percent_escape() {
        assert_eq!(format("100%% of %s", &["it"]), "100%% of it");
    }

    #[test]
    fn test_format_missing_and_surplus_args() {
        assert_eq!(format("%s and %s", &["one"]), "one and %s");
        assert_eq!(format("plain", &["ignored"]), "plain");
        assert_eq!(format("%x %s", &["a"]), "%x a");
    }

    #[test]
    fn test_format_propagates_render_errors() {
        let result = format_with("%s", 1, |_, _| Err("boom"));
        assert_eq!(result, Err("boom"));
    }
}
