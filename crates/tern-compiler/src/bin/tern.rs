// src/bin/tern.rs

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tern_bytecode::{disassemble, CodeFile};
use tern_compiler::{codefile_path, compile_to_result_with, Compiler, CompilerError, OptLevel};
use tern_codegen::EmitOptions;
use tern_vm::{load_assembly, Vm, VmOptions};
use tracing_subscriber::EnvFilter;

/// Tern compiler and virtual machine
#[derive(Parser)]
#[command(name = "tern")]
#[command(version)]
#[command(about = "Tern compiler and virtual machine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a Tern source file to a codefile
    Build {
        /// Path to the .tn source file
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Output path (default: FILE.tbc)
        #[arg(short, long, value_name = "OUT")]
        output: Option<PathBuf>,
        /// Optimisation level
        #[arg(short = 'O', long = "opt", value_enum, default_value_t = Opt::Default)]
        opt: Opt,
        /// Print the compile result as JSON on stdout
        #[arg(long)]
        json: bool,
    },
    /// Execute a codefile's Main function
    Run {
        /// Path to the codefile
        #[arg(value_name = "CODEFILE")]
        file: PathBuf,
        /// Extra directory to search for extern libraries
        #[arg(short = 'L', long = "lib-path", value_name = "DIR")]
        library_paths: Vec<PathBuf>,
        /// Abort after this many instructions
        #[arg(long, value_name = "N")]
        max_steps: Option<u64>,
    },
    /// Print a codefile listing
    Disasm {
        /// Path to the codefile
        #[arg(value_name = "CODEFILE")]
        file: PathBuf,
        /// Write the listing here instead of stdout
        #[arg(short, long, value_name = "OUT")]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Opt {
    None,
    Default,
    Fast,
}

impl From<Opt> for OptLevel {
    fn from(opt: Opt) -> Self {
        match opt {
            Opt::None => OptLevel::None,
            Opt::Default => OptLevel::Default,
            Opt::Fast => OptLevel::Fast,
        }
    }
}

fn main() -> ExitCode {
    // Initialize tracing if TERN_LOG is set
    if let Ok(filter) = EnvFilter::try_from_env("TERN_LOG") {
        tracing_subscriber::fmt()
            .compact()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
        tracing::debug!("tracing initialized");
    }

    let cli = Cli::parse();
    match cli.command {
        Commands::Build {
            file,
            output,
            opt,
            json,
        } => {
            let options = EmitOptions::default().with_opt_level(opt.into());
            if json {
                build_json(&file, output, options)
            } else {
                build(&file, output, options)
            }
        }
        Commands::Run {
            file,
            library_paths,
            max_steps,
        } => run(&file, library_paths, max_steps),
        Commands::Disasm { file, output } => disasm(&file, output.as_deref()),
    }
}

fn build(file: &Path, output: Option<PathBuf>, options: EmitOptions) -> ExitCode {
    let mut compiler = Compiler::new(options);
    if let Some(output) = output {
        compiler = compiler.with_output(output);
    }
    match compiler.try_compile_from_source(file) {
        Ok(_) => ExitCode::SUCCESS,
        Err(CompilerError::Diagnostics { .. }) => {
            eprintln!("{}", compiler.errors().render());
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn build_json(file: &Path, output: Option<PathBuf>, options: EmitOptions) -> ExitCode {
    let source = match std::fs::read_to_string(file) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("error: failed to read '{}': {e}", file.display());
            return ExitCode::FAILURE;
        }
    };
    let result = compile_to_result_with(&source, &file.to_string_lossy(), options);
    match serde_json::to_string_pretty(&result) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    }
    let Some(bytes) = &result.codefile else {
        return ExitCode::FAILURE;
    };
    let output = output.unwrap_or_else(|| codefile_path(file));
    if let Err(e) = std::fs::write(&output, bytes) {
        eprintln!("error: failed to write '{}': {e}", output.display());
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn run(file: &Path, library_paths: Vec<PathBuf>, max_steps: Option<u64>) -> ExitCode {
    let assembly = match load_assembly(file) {
        Ok(assembly) => assembly,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let options = VmOptions {
        library_paths,
        max_steps,
        ..VmOptions::default()
    };
    let mut vm = Vm::new(options);
    vm.set_assembly(assembly);
    match vm.execute_main() {
        // The process exit status carries the low byte of Main's result.
        Ok(value) => ExitCode::from((value.as_u64() & 0xFF) as u8),
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn disasm(file: &Path, output: Option<&Path>) -> ExitCode {
    if let Some(output) = output {
        let mut compiler = Compiler::default();
        if compiler.disassembly(file, output) {
            return ExitCode::SUCCESS;
        }
        if let Some(e) = compiler.last_error() {
            eprintln!("error: {e}");
        }
        return ExitCode::FAILURE;
    }
    match CodeFile::read_file(file) {
        Ok(codefile) => {
            print!("{}", disassemble(&codefile));
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
