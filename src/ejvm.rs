use std::process::ExitCode;

use clap::Parser;
use ejvm::memory::MB;
use ejvm::{VMConfig, VMError, VM};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Class search path of directories and jar files
    #[arg(short, long)]
    class_path: Option<String>,

    /// Heap limit in MiB
    #[arg(long, default_value_t = 64)]
    heap_mb: usize,

    /// Stack slots of each execution
    #[arg(long)]
    stack_slots: Option<usize>,

    /// Collect garbage on every n-th allocation
    #[arg(long)]
    gc_stress: Option<u32>,

    /// The main class, in internal (`demo/Main`) or binary (`demo.Main`) form
    main_class: String,

    /// Arguments passed to `main`
    args: Vec<String>,
}

fn run(cli: Cli) -> Result<(), VMError> {
    let mut cfg = VMConfig::default()
        .set_heap_limit(cli.heap_mb.saturating_mul(MB))
        .set_gc_stress(cli.gc_stress);
    if let Some(cp) = &cli.class_path {
        cfg = cfg.set_class_path(cp);
    }
    if let Some(slots) = cli.stack_slots {
        cfg = cfg.set_stack_slots(slots);
    }
    let mut vm = VM::new(cfg)?;
    let main_class = cli.main_class.replace('.', "/");
    let args: Vec<&str> = cli.args.iter().map(String::as_str).collect();
    vm.run(&main_class, &args)
}

fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();
    let thread = std::thread::Builder::new()
        .stack_size(4 * 1024 * 1024)
        .name("main".to_string())
        .spawn(move || run(cli));

    let result = match thread {
        Ok(handle) => handle
            .join()
            .unwrap_or_else(|_| Err(VMError::InvalidState("main thread panicked".into()))),
        Err(e) => Err(VMError::InvalidState(format!("cannot spawn main thread: {}", e))),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
