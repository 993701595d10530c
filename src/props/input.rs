//! Input property: where a search reads from

use std::fs;
use std::path::{Path, PathBuf};

use glob::glob;
use log::debug;
use once_cell::unsync::OnceCell;
use serde_yaml::Value;

use crate::context::RunContext;
use crate::error::{DefinitionError, EvalError};
use crate::facts::collect::CommandArgs;
use crate::props::{scalar_string, string_list};

#[derive(Debug)]
enum Source {
    Paths {
        paths: Vec<String>,
        allow_all_logs: bool,
    },
    Command {
        collector: String,
        args: CommandArgs,
        args_callback: Option<String>,
    },
}

/// Resolves to the concrete file path(s) a search scans.
///
/// Command-backed inputs run their collector at most once: the output is
/// serialized to one scratch file and the path is cached for the
/// property's lifetime, so repeated reads never re-invoke the collector.
#[derive(Debug)]
pub struct InputProperty {
    source: Source,
    resolved: OnceCell<Vec<PathBuf>>,
}

impl InputProperty {
    /// Parse an `input` override. Collector and args-callback names are
    /// resolved against the RunContext registries here, at load time.
    pub fn parse(at: &str, value: &Value, ctx: &RunContext) -> Result<Self, DefinitionError> {
        // scalar shorthand for a single path
        if let Some(path) = scalar_string(value) {
            return Ok(Self::with_source(Source::Paths {
                paths: vec![path],
                allow_all_logs: true,
            }));
        }
        let Value::Mapping(m) = value else {
            return Err(DefinitionError::invalid(at, "'input' must be a mapping"));
        };

        let allow_all_logs = m
            .get("options")
            .and_then(Value::as_mapping)
            .and_then(|o| o.get("allow-all-logs"))
            .and_then(Value::as_bool)
            .unwrap_or(true);

        match (m.get("path"), m.get("command")) {
            (Some(_), Some(_)) => Err(DefinitionError::invalid(
                at,
                "'path' and 'command' are mutually exclusive",
            )),
            (Some(path), None) => Ok(Self::with_source(Source::Paths {
                paths: string_list(at, path)?,
                allow_all_logs,
            })),
            (None, Some(command)) => {
                let collector = scalar_string(command)
                    .ok_or_else(|| DefinitionError::invalid(at, "'command' must be a string"))?;
                if !ctx.collectors().contains(&collector) {
                    return Err(DefinitionError::UnknownCollector(collector));
                }

                let mut args = CommandArgs::default();
                if let Some(list) = m.get("args") {
                    args.args = string_list(at, list)?;
                }
                if let Some(kwargs) = m.get("kwargs") {
                    let Value::Mapping(kw) = kwargs else {
                        return Err(DefinitionError::invalid(at, "'kwargs' must be a mapping"));
                    };
                    for (k, v) in kw {
                        match (k.as_str(), scalar_string(v)) {
                            (Some(k), Some(v)) => {
                                args.kwargs.insert(k.to_string(), v);
                            }
                            _ => {
                                return Err(DefinitionError::invalid(
                                    at,
                                    "'kwargs' entries must be scalar",
                                ))
                            }
                        }
                    }
                }

                let args_callback = match m.get("args-callback") {
                    Some(v) => {
                        let name = scalar_string(v).ok_or_else(|| {
                            DefinitionError::invalid(at, "'args-callback' must be a string")
                        })?;
                        if ctx.args_callback(&name).is_none() {
                            return Err(DefinitionError::invalid(
                                at,
                                format!("unknown args-callback '{name}'"),
                            ));
                        }
                        Some(name)
                    }
                    None => None,
                };

                Ok(Self::with_source(Source::Command {
                    collector,
                    args,
                    args_callback,
                }))
            }
            (None, None) => Err(DefinitionError::invalid(
                at,
                "'input' needs a 'path' or a 'command'",
            )),
        }
    }

    fn with_source(source: Source) -> Self {
        Self {
            source,
            resolved: OnceCell::new(),
        }
    }

    /// Concrete search sources. Memoized; a command-backed input invokes
    /// its collector only on the first call.
    pub fn sources(&self, ctx: &RunContext) -> Result<&[PathBuf], EvalError> {
        let paths = self.resolved.get_or_try_init(|| self.resolve(ctx))?;
        Ok(paths.as_slice())
    }

    fn resolve(&self, ctx: &RunContext) -> Result<Vec<PathBuf>, EvalError> {
        match &self.source {
            Source::Paths {
                paths,
                allow_all_logs,
            } => {
                let mut out = Vec::new();
                for path in paths {
                    let full = ctx.data_root().join(path);
                    if ctx.all_logs() && *allow_all_logs {
                        out.extend(rotated_copies(&full));
                    } else {
                        out.push(full);
                    }
                }
                Ok(out)
            }
            Source::Command {
                collector,
                args,
                args_callback,
            } => {
                let Some(imp) = ctx.collectors().get(collector) else {
                    return Err(DefinitionError::UnknownCollector(collector.clone()).into());
                };
                let args = match args_callback {
                    Some(name) => match ctx.args_callback(name) {
                        Some(cb) => cb(ctx),
                        None => return Err(EvalError::NoCallback(name.clone())),
                    },
                    None => args.clone(),
                };
                match imp.run(ctx.data_root(), &args)? {
                    Some(lines) if !lines.is_empty() => {
                        let file = ctx.scratch_file(&scratch_name(collector, &args))?;
                        fs::write(&file, lines.join("\n") + "\n").map_err(|source| {
                            EvalError::Scratch {
                                file: file.clone(),
                                source,
                            }
                        })?;
                        Ok(vec![file])
                    }
                    _ => {
                        debug!("collector '{collector}' produced no data");
                        Ok(Vec::new())
                    }
                }
            }
        }
    }
}

/// Expand a log path to its rotated copies (`<path>*`), sorted. Falls
/// back to the bare path when nothing matches so the searcher can report
/// the missing source itself.
fn rotated_copies(path: &Path) -> Vec<PathBuf> {
    let pattern = format!("{}*", path.display());
    match glob(&pattern) {
        Ok(entries) => {
            let mut found: Vec<PathBuf> = entries.flatten().collect();
            if found.is_empty() {
                return vec![path.to_path_buf()];
            }
            found.sort();
            found
        }
        Err(_) => vec![path.to_path_buf()],
    }
}

fn scratch_name(collector: &str, args: &CommandArgs) -> String {
    let mut name = collector.to_string();
    for arg in &args.args {
        name.push('_');
        name.push_str(arg);
    }
    for (k, v) in &args.kwargs {
        name.push('_');
        name.push_str(k);
        name.push('_');
        name.push_str(v);
    }
    let safe: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{safe}.out")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::collect::FnCollector;
    use std::cell::Cell;
    use std::rc::Rc;
    use tempfile::TempDir;

    fn val(yaml: &str) -> Value {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_path_joins_data_root() {
        let tmp = TempDir::new().unwrap();
        let ctx = RunContext::new(tmp.path());
        let input = InputProperty::parse("t", &val("{path: var/log/syslog}"), &ctx).unwrap();
        let sources = input.sources(&ctx).unwrap();
        assert_eq!(sources, [tmp.path().join("var/log/syslog")]);
    }

    #[test]
    fn test_all_logs_expands_rotated_copies() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("var/log")).unwrap();
        fs::write(tmp.path().join("var/log/app.log"), "x").unwrap();
        fs::write(tmp.path().join("var/log/app.log.1"), "x").unwrap();

        let ctx = RunContext::new(tmp.path()).with_all_logs(true);
        let input = InputProperty::parse("t", &val("{path: var/log/app.log}"), &ctx).unwrap();
        let sources = input.sources(&ctx).unwrap();
        assert_eq!(
            sources,
            [
                tmp.path().join("var/log/app.log"),
                tmp.path().join("var/log/app.log.1"),
            ]
        );
    }

    #[test]
    fn test_all_logs_opt_out() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("var/log")).unwrap();
        fs::write(tmp.path().join("var/log/app.log"), "x").unwrap();
        fs::write(tmp.path().join("var/log/app.log.1"), "x").unwrap();

        let ctx = RunContext::new(tmp.path()).with_all_logs(true);
        let input = InputProperty::parse(
            "t",
            &val("{path: var/log/app.log, options: {allow-all-logs: false}}"),
            &ctx,
        )
        .unwrap();
        assert_eq!(
            input.sources(&ctx).unwrap(),
            [tmp.path().join("var/log/app.log")]
        );
    }

    #[test]
    fn test_command_runs_collector_once() {
        let tmp = TempDir::new().unwrap();
        let calls = Rc::new(Cell::new(0usize));
        let seen = Rc::clone(&calls);
        let ctx = RunContext::new(tmp.path()).with_collector(Box::new(FnCollector::new(
            "fake",
            move |_root, _args| {
                seen.set(seen.get() + 1);
                Ok(Some(vec!["line one".to_string(), "line two".to_string()]))
            },
        )));

        let input = InputProperty::parse("t", &val("{command: fake}"), &ctx).unwrap();
        let first = input.sources(&ctx).unwrap().to_vec();
        let second = input.sources(&ctx).unwrap().to_vec();
        assert_eq!(first, second);
        assert_eq!(calls.get(), 1);
        assert_eq!(
            fs::read_to_string(&first[0]).unwrap(),
            "line one\nline two\n"
        );
    }

    #[test]
    fn test_command_without_data_yields_no_sources() {
        let tmp = TempDir::new().unwrap();
        let ctx = RunContext::new(tmp.path()).with_collector(Box::new(FnCollector::new(
            "empty",
            |_root, _args| Ok(None),
        )));
        let input = InputProperty::parse("t", &val("{command: empty}"), &ctx).unwrap();
        assert!(input.sources(&ctx).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_collector_fails_at_parse() {
        let tmp = TempDir::new().unwrap();
        let ctx = RunContext::new(tmp.path());
        let err = InputProperty::parse("t", &val("{command: made-up}"), &ctx).unwrap_err();
        assert!(matches!(err, DefinitionError::UnknownCollector(name) if name == "made-up"));
    }

    #[test]
    fn test_path_and_command_exclusive() {
        let tmp = TempDir::new().unwrap();
        let ctx = RunContext::new(tmp.path());
        assert!(InputProperty::parse("t", &val("{path: a, command: journal}"), &ctx).is_err());
    }
}
