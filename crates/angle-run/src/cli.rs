use angle_lang::{Scope, ScopeError, ScopeOptions, Value};
use clap::{Parser, Subcommand};
use colored::Colorize;
use itertools::Itertools;
use miette::IntoDiagnostic;
use miette::miette;
use std::cell::{Cell, RefCell};
use std::io::{self, BufWriter, Write};
use std::rc::Rc;
use std::{fs, path::PathBuf};
use tracing::debug;

#[derive(Parser, Debug, Default)]
#[command(name = "angle")]
#[command(author = env!("CARGO_PKG_AUTHORS"))]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(after_help = "# Examples:\n\n\
    ## To evaluate an expression against a scope:\n\
    angle --scope '{\"user\": {\"name\": \"ann\"}}' 'user.name'\n\n\
    ## To print how an expression is watched:\n\
    angle --inspect 'items | filter:query'\n\n\
    ## To see which watchers fire when an expression is applied:\n\
    angle --scope '{\"a\": 1}' --watch 'a * 2' 'a = 5'\n\n\
    ## To check expressions in a file, one per line:\n\
    angle check expressions.txt")]
#[command(
    about = "angle evaluates and inspects expressions against a JSON scope.",
    long_about = None
)]
pub struct Cli {
    #[clap(flatten)]
    input: InputArgs,

    #[clap(flatten)]
    output: OutputArgs,

    #[clap(subcommand)]
    commands: Option<Commands>,

    #[arg(value_name = "EXPRESSION")]
    expression: Option<String>,
}

#[derive(Clone, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Json,
    Text,
    None,
}

#[derive(Clone, Debug, clap::Args)]
struct InputArgs {
    /// Initial scope contents as a JSON object
    #[arg(short, long, value_name = "JSON", conflicts_with = "scope_file")]
    scope: Option<String>,

    /// Read the initial scope contents from a JSON file
    #[arg(short = 'S', long, value_name = "FILE")]
    scope_file: Option<PathBuf>,

    /// Expressions to watch while the main expression is applied
    #[arg(short, long, value_name = "EXPRESSION")]
    watch: Option<Vec<String>>,

    /// Maximum number of dirty passes per digest
    #[arg(long, default_value_t = ScopeOptions::default().ttl)]
    ttl: usize,
}

impl Default for InputArgs {
    fn default() -> Self {
        Self {
            scope: None,
            scope_file: None,
            watch: None,
            ttl: ScopeOptions::default().ttl,
        }
    }
}

#[derive(Clone, Debug, clap::Args, Default)]
struct OutputArgs {
    /// Set output format
    #[arg(short = 'F', long, value_enum, default_value_t)]
    output_format: OutputFormat,

    /// Print the tokens of the expression instead of evaluating it
    #[arg(long, default_value_t = false)]
    tokens: bool,

    /// Print the parsed expression instead of evaluating it
    #[arg(long, default_value_t = false)]
    ast: bool,

    /// Print how the expression would be watched instead of evaluating it
    #[arg(long, default_value_t = false)]
    inspect: bool,

    /// Unbuffered output
    #[clap(long, default_value_t = false)]
    unbuffered: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Check syntax errors in files of expressions, one expression per line
    Check {
        /// Path to the files to check
        files: Vec<PathBuf>,
    },
}

/// A watcher firing recorded during `--watch`.
struct Firing {
    expression: String,
    old: Value,
    new: Value,
}

impl Cli {
    pub fn run(&self) -> miette::Result<()> {
        match &self.commands {
            Some(Commands::Check { files }) => self.check(files),
            None => {
                let expression = self
                    .expression
                    .as_deref()
                    .ok_or_else(|| miette!("Expression is required"))?;

                if self.output.tokens {
                    self.print_tokens(expression)
                } else if self.output.ast {
                    self.print_ast(expression)
                } else if self.output.inspect {
                    self.inspect(expression)
                } else {
                    self.evaluate(expression)
                }
            }
        }
    }

    fn create_scope(&self) -> miette::Result<Scope> {
        let scope = Scope::with_options(
            angle_lang::Parser::default(),
            angle_lang::TaskQueue::new(),
            ScopeOptions { ttl: self.input.ttl },
        );

        let contents = match (&self.input.scope, &self.input.scope_file) {
            (Some(json), _) => json.clone(),
            (None, Some(path)) => {
                if !path.exists() {
                    return Err(miette!("File not found: {}", path.display()));
                }
                fs::read_to_string(path).into_diagnostic()?
            }
            (None, None) => return Ok(scope),
        };

        match serde_json::from_str::<serde_json::Value>(&contents).into_diagnostic()? {
            serde_json::Value::Object(entries) => {
                for (key, value) in entries {
                    scope.set(&key, Value::from(value));
                }
                Ok(scope)
            }
            other => Err(miette!("Scope must be a JSON object, got `{}`", other)),
        }
    }

    fn evaluate(&self, expression: &str) -> miette::Result<()> {
        let scope = self.create_scope()?;

        let Some(watches) = &self.input.watch else {
            let value = scope.eval(expression).map_err(into_report)?;
            return self.print(&[value.to_json()], &[]);
        };

        let firings: Rc<RefCell<Vec<Firing>>> = Rc::default();
        let recording = Rc::new(Cell::new(false));

        for watch in watches {
            let log = Rc::clone(&firings);
            let recording = Rc::clone(&recording);
            let source = watch.clone();

            scope
                .watch(
                    watch.as_str(),
                    move |new, old, _| {
                        if recording.get() {
                            log.borrow_mut().push(Firing {
                                expression: source.clone(),
                                old: old.clone(),
                                new: new.clone(),
                            });
                        }
                        Ok(())
                    },
                    false,
                )
                .map_err(into_report)?;
        }

        scope.digest().map_err(into_report)?;
        debug!(watchers = watches.len(), "Initial digest finished");

        recording.set(true);
        let value = scope.apply(expression).map_err(into_report)?;

        self.print(&[value.to_json()], &firings.borrow())
    }

    fn print_tokens(&self, expression: &str) -> miette::Result<()> {
        let tokens = angle_lang::tokenize(expression)?;

        self.write_lines(
            tokens
                .iter()
                .filter(|token| !token.is_eof())
                .map(|token| format!("{}\t{:?}", token.range, token.kind)),
        )
    }

    fn print_ast(&self, expression: &str) -> miette::Result<()> {
        let program = angle_lang::parse_ast(expression)?;
        self.write_lines(program.body.iter().map(|node| node.to_string()))
    }

    fn inspect(&self, expression: &str) -> miette::Result<()> {
        let compiled = angle_lang::compile(expression)?;
        let delegate = compiled
            .watch_delegate()
            .map(|delegate| format!("{:?}", delegate))
            .unwrap_or_else(|| "None".to_string());
        let inputs = compiled.inputs().iter().map(|input| input.source()).join(", ");

        self.write_lines(
            [
                format!("literal: {}", compiled.is_literal()),
                format!("constant: {}", compiled.is_constant()),
                format!("one-time: {}", compiled.is_one_time()),
                format!("assignable: {}", compiled.is_assignable()),
                format!("delegate: {}", delegate),
                format!("inputs: [{}]", inputs),
            ]
            .into_iter(),
        )
    }

    fn check(&self, files: &[PathBuf]) -> miette::Result<()> {
        let stdout = io::stdout();
        let mut handle = BufWriter::new(stdout.lock());
        let mut has_error = false;

        for file in files {
            if !file.exists() {
                return Err(miette!("File not found: {}", file.display()));
            }

            let content = fs::read_to_string(file).into_diagnostic()?;
            let errors = content
                .lines()
                .enumerate()
                .filter(|(_, line)| !line.trim().is_empty())
                .filter_map(|(index, line)| {
                    angle_lang::compile(line).err().map(|err| (index + 1, err))
                })
                .collect::<Vec<_>>();

            if errors.is_empty() {
                continue;
            }

            has_error = true;
            writeln!(handle, "{}", format!("Checking: {}", file.display()).bold()).into_diagnostic()?;

            for (line, err) in errors {
                writeln!(handle, "  {}: {} at line {}", "Error".red().bold(), err, line)
                    .into_diagnostic()?;
            }
            writeln!(handle).into_diagnostic()?;
        }

        handle.flush().into_diagnostic()?;

        if has_error {
            Err(miette!("Syntax errors found"))
        } else {
            Ok(())
        }
    }

    fn print(&self, values: &[serde_json::Value], firings: &[Firing]) -> miette::Result<()> {
        let values = values
            .iter()
            .filter_map(|value| match self.output.output_format {
                OutputFormat::Json => Some(serde_json::to_string_pretty(value).into_diagnostic()),
                OutputFormat::Text => Some(Ok(match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })),
                OutputFormat::None => None,
            })
            .collect::<miette::Result<Vec<_>>>()?;

        self.write_lines(values.into_iter().chain(firings.iter().map(|firing| {
            format!(
                "{}: {} -> {}",
                firing.expression,
                firing.old.to_json(),
                firing.new.to_json()
            )
        })))
    }

    fn write_lines(&self, lines: impl Iterator<Item = String>) -> miette::Result<()> {
        let stdout = io::stdout();
        let mut handle: Box<dyn Write> = if self.output.unbuffered {
            Box::new(stdout.lock())
        } else {
            Box::new(BufWriter::new(stdout.lock()))
        };

        for line in lines {
            writeln!(handle, "{}", line).into_diagnostic()?;
        }

        handle.flush().into_diagnostic()
    }
}

fn into_report(err: ScopeError) -> miette::Report {
    match err {
        ScopeError::Expression(err) => (*err).into(),
        other => miette!("{}", other),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use scopeguard::defer;
    use std::fs::File;

    use super::*;

    fn create_file(name: &str, content: &str) -> PathBuf {
        let temp_file_path = std::env::temp_dir().join(name);
        let mut file = File::create(&temp_file_path).expect("Failed to create temp file");
        file.write_all(content.as_bytes())
            .expect("Failed to write to temp file");

        temp_file_path
    }

    fn cli(expression: &str) -> Cli {
        Cli {
            expression: Some(expression.to_string()),
            ..Cli::default()
        }
    }

    #[rstest]
    #[case::literal("1 + 2")]
    #[case::member("user.name")]
    #[case::filter("[1, 2, 3] | filter:2")]
    fn test_cli_evaluate(#[case] expression: &str) {
        let cli = Cli {
            input: InputArgs {
                scope: Some(r#"{"user": {"name": "ann"}}"#.to_string()),
                ..Default::default()
            },
            ..cli(expression)
        };

        assert!(cli.run().is_ok());
    }

    #[rstest]
    #[case::lexer("'abc")]
    #[case::parser("a +")]
    #[case::unknown_filter("a | nope")]
    #[case::sandbox("constructor")]
    fn test_cli_invalid_expression(#[case] expression: &str) {
        assert!(cli(expression).run().is_err());
    }

    #[test]
    fn test_cli_requires_expression() {
        assert!(Cli::default().run().is_err());
    }

    #[rstest]
    #[case::array("[1, 2]")]
    #[case::string("\"scope\"")]
    #[case::invalid("{")]
    fn test_cli_scope_must_be_object(#[case] scope: &str) {
        let cli = Cli {
            input: InputArgs {
                scope: Some(scope.to_string()),
                ..Default::default()
            },
            ..cli("a")
        };

        assert!(cli.run().is_err());
    }

    #[test]
    fn test_cli_scope_file() {
        let path = create_file("angle_scope_file.json", r#"{"a": 41}"#);
        let cleanup = path.clone();

        defer! {
            if cleanup.exists() {
                std::fs::remove_file(&cleanup).expect("Failed to delete temp file");
            }
        }

        let scope = Cli {
            input: InputArgs {
                scope_file: Some(path),
                ..Default::default()
            },
            ..cli("a + 1")
        }
        .create_scope()
        .unwrap();

        assert_eq!(scope.get("a"), Value::from(41.0));
    }

    #[test]
    fn test_cli_scope_file_not_found() {
        let cli = Cli {
            input: InputArgs {
                scope_file: Some(PathBuf::from("angle_missing_scope.json")),
                ..Default::default()
            },
            ..cli("a")
        };

        assert!(cli.run().is_err());
    }

    #[rstest]
    #[case::tokens(OutputArgs { tokens: true, ..Default::default() })]
    #[case::ast(OutputArgs { ast: true, ..Default::default() })]
    #[case::inspect(OutputArgs { inspect: true, ..Default::default() })]
    #[case::text(OutputArgs { output_format: OutputFormat::Text, ..Default::default() })]
    #[case::none(OutputArgs { output_format: OutputFormat::None, ..Default::default() })]
    fn test_cli_output_modes(#[case] output: OutputArgs) {
        let cli = Cli {
            output,
            ..cli("items | filter:{done: false}")
        };

        assert!(cli.run().is_ok());
    }

    #[test]
    fn test_cli_watch_exceeding_ttl() {
        let cli = Cli {
            input: InputArgs {
                scope: Some(r#"{"a": 0}"#.to_string()),
                watch: Some(vec!["a = a + 1".to_string()]),
                ttl: 10,
                ..Default::default()
            },
            ..cli("a = 1")
        };

        assert!(cli.run().is_err());
    }

    #[test]
    fn test_cli_check_command() {
        let valid = create_file("angle_check_valid.txt", "a + 1\n\nuser.name | filter:'x'\n");
        let invalid = create_file("angle_check_invalid.txt", "a +\nb\n");
        let (valid_cleanup, invalid_cleanup) = (valid.clone(), invalid.clone());

        defer! {
            for path in [&valid_cleanup, &invalid_cleanup] {
                if path.exists() {
                    std::fs::remove_file(path).expect("Failed to delete temp file");
                }
            }
        }

        let check = |files: Vec<PathBuf>| Cli {
            commands: Some(Commands::Check { files }),
            ..Cli::default()
        };

        assert!(check(vec![valid.clone()]).run().is_ok());
        assert!(check(vec![valid, invalid]).run().is_err());
        assert!(check(vec![PathBuf::from("angle_missing.txt")]).run().is_err());
    }
}
