use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use fieldkit::{Analysis, Compiler, Lint, LintConfig, LintLevel, describe_defaults};
use log::info;
use std::{path::PathBuf, str::FromStr};

#[derive(Parser)]
#[command(name = "fieldkitc", version, about = "Kit field defaults checker and compiler")]
struct Cli {
    #[command(flatten)]
    lints: LintArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct LintArgs {
    /// Silence a lint (e.g. `overflowing_literals`)
    #[arg(short = 'A', long = "allow", global = true, value_name = "LINT")]
    allow: Vec<String>,

    /// Report a lint as a warning
    #[arg(short = 'W', long = "warn", global = true, value_name = "LINT")]
    warn: Vec<String>,

    /// Report a lint as an error
    #[arg(short = 'D', long = "deny", global = true, value_name = "LINT")]
    deny: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate every field default and report diagnostics
    Check {
        /// the `.kit` source files
        #[arg(required = true)]
        sources: Vec<PathBuf>,
    },
    /// Check, then emit C code with one `T_default` function per derived struct
    Compile {
        /// the `.kit` source files
        #[arg(required = true)]
        sources: Vec<PathBuf>,

        /// the generated C file
        #[arg(short, long, default_value = "out.c")]
        output: PathBuf,
    },
    /// Check, then print every default table and synthesized constructor
    Defaults {
        /// the `.kit` source files
        #[arg(required = true)]
        sources: Vec<PathBuf>,
    },
}

impl LintArgs {
    fn to_config(&self) -> anyhow::Result<LintConfig> {
        let mut config = LintConfig::new();
        let groups = [
            (LintLevel::Allow, &self.allow),
            (LintLevel::Warn, &self.warn),
            (LintLevel::Deny, &self.deny),
        ];
        for (level, names) in groups {
            for name in names {
                let Ok(lint) = Lint::from_str(name) else {
                    bail!("unknown lint `{name}`");
                };
                config.set(lint, level);
            }
        }
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Cli::parse();
    let lints = args.lints.to_config()?;

    match args.command {
        Commands::Check { sources } => {
            let compiler = Compiler::new(sources, "out.c").with_lints(lints);
            let analysis = analyze(&compiler)?;
            report(&compiler, &analysis)?;
            println!("→ All field defaults are valid");
        }
        Commands::Compile { sources, output } => {
            let compiler = Compiler::new(sources, &output).with_lints(lints);
            let analysis = analyze(&compiler)?;
            report(&compiler, &analysis)?;
            compiler
                .emit(&analysis)
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!("→ Successfully compiled to {}", output.display());
        }
        Commands::Defaults { sources } => {
            let compiler = Compiler::new(sources, "out.c").with_lints(lints);
            let analysis = analyze(&compiler)?;
            report(&compiler, &analysis)?;
            print!("{}", describe_defaults(&analysis));
        }
    }
    Ok(())
}

fn analyze(compiler: &Compiler) -> anyhow::Result<Analysis> {
    info!("Analyzing {} file(s)", compiler.files().len());
    compiler.analyze().context("failed to compile")
}

/// Prints every diagnostic to stderr and fails when any of them is an error.
fn report(compiler: &Compiler, analysis: &Analysis) -> anyhow::Result<()> {
    for diagnostic in &analysis.diagnostics {
        let file = compiler
            .files()
            .get(diagnostic.span().file_id as usize)
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        eprintln!("{}", diagnostic.render(&file));
    }

    let errors = analysis.diagnostics.error_count();
    if errors > 0 {
        bail!(
            "aborting due to {errors} previous error{}",
            if errors == 1 { "" } else { "s" }
        );
    }
    Ok(())
}
