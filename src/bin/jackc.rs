use std::{
    fmt::Display,
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use jack::{
    compiler, lexer,
    token::{Spanned, Token},
    util::intern::Interner,
    vm, xml,
};
use log::{debug, error, info};

#[derive(Parser, Debug)]
#[command(version, about = "Compiles Jack classes into VM code", long_about = None)]
struct CliArgs {
    /// Source files, or directories whose `.jack` files are all compiled.
    #[arg(value_name = "PATH", required = true)]
    paths: Vec<PathBuf>,

    /// What to write for each class.
    #[arg(long, value_enum, default_value_t = Emit::Vm)]
    emit: Emit,

    /// Writes outputs into this directory instead of next to each source.
    #[arg(long, value_name = "DIR")]
    out_dir: Option<PathBuf>,

    /// Logs more (repeat for debug and trace output).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Logs nothing, not even errors.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Emit {
    /// `<Name>.vm`, the compiled program.
    Vm,
    /// `<Name>T.xml`, the token listing.
    Tokens,
    /// `<Name>.xml`, the parse tree.
    Xml,
}

fn main() -> Result<ExitCode> {
    let args = CliArgs::parse();
    stderrlog::new()
        .module(module_path!())
        .module("jack")
        .quiet(args.quiet)
        .verbosity(usize::from(args.verbose) + 1)
        .init()
        .map_err(|e| anyhow!("failed to set up logging: {e}"))?;

    let sources = collect_sources(&args.paths)?;
    if let Some(dir) = &args.out_dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let mut session = Session {
        tokens: Vec::with_capacity(lexer::SUGGESTED_TOKENS_CAPACITY),
        interner: Interner::with_capacity(1024),
        emit: args.emit,
        out_dir: args.out_dir,
    };
    let mut failed = 0;
    for path in &sources {
        if let Err(e) = session.compile_file(path) {
            error!("{e:#}");
            failed += 1;
        }
    }

    debug!("interned {} distinct names", session.interner.len());
    if failed == 0 {
        Ok(ExitCode::SUCCESS)
    } else {
        error!("{failed} of {} files failed to compile", sources.len());
        Ok(ExitCode::FAILURE)
    }
}

/// Expands directories into the `.jack` files directly inside them, sorted by
/// name.
fn collect_sources(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut sources = Vec::new();
    for path in paths {
        if !path.is_dir() {
            sources.push(path.clone());
            continue;
        }
        let entries =
            fs::read_dir(path).with_context(|| format!("failed to read {}", path.display()))?;
        let mut found = Vec::new();
        for entry in entries {
            let entry = entry?.path();
            if entry.is_file() && entry.extension().is_some_and(|ext| ext == "jack") {
                found.push(entry);
            }
        }
        found.sort();
        debug!("found {} sources in {}", found.len(), path.display());
        sources.extend(found);
    }
    Ok(sources)
}

/// Buffers shared by every compiled file.
struct Session {
    tokens: Vec<Token>,
    interner: Interner,
    emit: Emit,
    out_dir: Option<PathBuf>,
}

impl Session {
    /// Writes the output only if the whole file compiles.
    fn compile_file(&mut self, path: &Path) -> Result<()> {
        let src = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .with_context(|| format!("invalid file name {}", path.display()))?;

        self.tokens.clear();
        let (file_name, output) = match self.emit {
            Emit::Vm => {
                let code = compiler::compile(&src, &mut self.tokens, &mut self.interner)
                    .map_err(|(_, e)| located(path, &src, &e))?;
                (format!("{name}.vm"), vm::program_string(&code))
            }
            Emit::Tokens => {
                lexer::lex(&src, &mut self.tokens);
                if let Some(e) = lexer::first_error(&self.tokens) {
                    return Err(located(path, &src, &e));
                }
                (format!("{name}T.xml"), xml::tokens_string(&src, &self.tokens))
            }
            Emit::Xml => {
                let (_, tree) =
                    compiler::compile_with_tree(&src, &mut self.tokens, &mut self.interner)
                        .map_err(|(_, e)| located(path, &src, &e))?;
                (format!("{name}.xml"), tree)
            }
        };

        let dir = match &self.out_dir {
            Some(dir) => dir.as_path(),
            None => path.parent().unwrap_or(Path::new(".")),
        };
        let out = dir.join(file_name);
        fs::write(&out, output).with_context(|| format!("failed to write {}", out.display()))?;
        info!("{} -> {}", path.display(), out.display());
        Ok(())
    }
}

/// Formats `error` as `path:line:col: message`.
fn located<E: Display>(path: &Path, src: &str, error: &Spanned<E>) -> anyhow::Error {
    let (line, col) = error.span.line_col(src);
    anyhow!("{}:{line}:{col}: {}", path.display(), error.inner)
}
