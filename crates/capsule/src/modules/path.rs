//! POSIX-style path arithmetic over a virtual filesystem.
//!
//! Purely lexical: nothing here consults a filesystem, and `.`/`..`
//! segments are kept as written.

use rquickjs::convert::Coerced;
use rquickjs::function::{Opt, Rest};
use rquickjs::{Ctx, Function, Object, Value};

use super::{BuiltinModule, ModuleEnv};

/// Concatenate segments with `/`, collapse separator runs and drop a trailing
/// separator. An empty result is the root.
pub fn join<S: AsRef<str>>(segments: &[S]) -> String {
    let mut joined = String::new();
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            joined.push('/');
        }
        joined.push_str(segment.as_ref());
    }

    let mut out = String::with_capacity(joined.len());
    for c in joined.chars() {
        if c == '/' && out.ends_with('/') {
            continue;
        }
        out.push(c);
    }
    if out.ends_with('/') {
        out.pop();
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// Resolve segments left to right starting at `cwd`. An absolute segment
/// replaces everything before it.
pub fn resolve<S: AsRef<str>>(cwd: &str, segments: &[S]) -> String {
    let mut resolved = cwd.to_string();
    for segment in segments {
        let segment = segment.as_ref();
        if segment.starts_with('/') {
            resolved = segment.to_string();
        } else {
            resolved = join(&[resolved.as_str(), segment]);
        }
    }
    resolved
}

/// Everything before the last separator, or `/`.
pub fn dirname(path: &str) -> String {
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(i) => path[..i].to_string(),
    }
}

/// The last segment, with `suffix` removed when it ends with it.
pub fn basename(path: &str, suffix: Option<&str>) -> String {
    let name = last_segment(path);
    match suffix {
        Some(suffix) if !suffix.is_empty() && name.ends_with(suffix) => {
            name[..name.len() - suffix.len()].to_string()
        }
        _ => name.to_string(),
    }
}

/// The last segment's extension including the dot. Leading-dot names such as
/// `.bashrc` have none.
pub fn extname(path: &str) -> String {
    let name = last_segment(path);
    match name.rfind('.') {
        Some(i) if i > 0 => name[i..].to_string(),
        _ => String::new(),
    }
}

fn last_segment(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or_default()
}

/// The `path` module.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathModule;

impl BuiltinModule for PathModule {
    fn name(&self) -> &'static str {
        "path"
    }

    fn methods(&self) -> &'static [&'static str] {
        &["join", "resolve", "dirname", "basename", "extname", "sep"]
    }

    fn instantiate<'js>(&self, ctx: &Ctx<'js>, env: &ModuleEnv) -> rquickjs::Result<Object<'js>> {
        let path = Object::new(ctx.clone())?;
        path.set("sep", "/")?;
        path.set(
            "join",
            Function::new(ctx.clone(), |segments: Rest<Coerced<String>>| {
                join(&strings(segments))
            })?
            .with_name("join")?,
        )?;

        let cwd = env.cwd.clone();
        path.set(
            "resolve",
            Function::new(ctx.clone(), move |segments: Rest<Coerced<String>>| {
                resolve(&cwd, &strings(segments))
            })?
            .with_name("resolve")?,
        )?;
        path.set(
            "dirname",
            Function::new(ctx.clone(), |p: Coerced<String>| dirname(&p.0))?.with_name("dirname")?,
        )?;
        path.set(
            "basename",
            Function::new(
                ctx.clone(),
                |p: Coerced<String>, suffix: Opt<Value<'js>>| -> rquickjs::Result<String> {
                    // A falsy suffix strips nothing.
                    let suffix = match suffix.0 {
                        Some(v) if v.is_string() => v.get::<String>()?,
                        _ => String::new(),
                    };
                    Ok(basename(&p.0, Some(suffix.as_str()).filter(|s| !s.is_empty())))
                },
            )?
            .with_name("basename")?,
        )?;
        path.set(
            "extname",
            Function::new(ctx.clone(), |p: Coerced<String>| extname(&p.0))?.with_name("extname")?,
        )?;
        Ok(path)
    }
}

fn strings(segments: Rest<Coerced<String>>) -> Vec<String> {
    segments.0.into_iter().map(|s| s.0).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join() {
        assert_eq!(join(&["/a", "b", "c"]), "/a/b/c");
        assert_eq!(join(&["/a/", "/b"]), "/a/b");
        assert_eq!(join(&["a", "b/"]), "a/b");
        assert_eq!(join(&["a//b", "", "c"]), "a/b/c");
        assert_eq!(join::<&str>(&[]), "/");
        assert_eq!(join(&["/"]), "/");
    }

    #[test]
    fn test_resolve() {
        assert_eq!(resolve("/workspace", &["/a", "b"]), "/a/b");
        assert_eq!(resolve("/workspace", &["/a", "/b"]), "/b");
        assert_eq!(resolve("/workspace", &["src", "main.js"]), "/workspace/src/main.js");
        assert_eq!(resolve::<&str>("/workspace", &[]), "/workspace");
    }

    #[test]
    fn test_dirname() {
        assert_eq!(dirname("/a/b/c.js"), "/a/b");
        assert_eq!(dirname("/a"), "/");
        assert_eq!(dirname("index.js"), "/");
        assert_eq!(dirname("src/index.js"), "src");
    }

    #[test]
    fn test_basename() {
        assert_eq!(basename("/a/b/c.js", Some(".js")), "c");
        assert_eq!(basename("/a/b/c.js", None), "c.js");
        assert_eq!(basename("/a/b/c.js", Some(".ts")), "c.js");
        assert_eq!(basename("/a/b/", None), "");
    }

    #[test]
    fn test_extname() {
        assert_eq!(extname("/a/b/README"), "");
        assert_eq!(extname("/a/b/c.test.js"), ".js");
        assert_eq!(extname("/home/.bashrc"), "");
        assert_eq!(extname("/a.d/file"), "");
    }
}
