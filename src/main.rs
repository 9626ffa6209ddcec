use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use lovejs::core::embed;
use lovejs::{App, EngineResult, LoveConfig, Mode};

#[derive(Parser, Debug)]
#[command(name = "lovejs")]
#[command(about = "Run LÖVE-style JavaScript games on QuickJS", long_about = None)]
struct Cli {
    /// Script to run (defaults to `script.entry` from the config)
    script: Option<PathBuf>,

    /// Run a compiled bytecode file
    #[arg(long, value_name = "FILE", conflicts_with_all = ["compile", "embed"])]
    bytecode: Option<PathBuf>,

    /// Compile SCRIPT to bytecode and exit
    #[arg(long, value_name = "OUT", conflicts_with = "embed")]
    compile: Option<PathBuf>,

    /// Compile SCRIPT and write a self-contained executable
    #[arg(long, value_name = "OUT")]
    embed: Option<PathBuf>,

    /// Run without a window
    #[arg(long)]
    headless: bool,

    /// Stop after N frames
    #[arg(long, value_name = "N")]
    frames: Option<u64>,

    /// Config file (TOML, or JSON by extension)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

impl Cli {
    fn mode(self) -> Mode {
        if let Some(output) = self.compile {
            Mode::Compile {
                script: self.script,
                output,
            }
        } else if let Some(output) = self.embed {
            Mode::Embed {
                script: self.script,
                output,
            }
        } else if let Some(path) = self.bytecode {
            Mode::Bytecode(path)
        } else {
            Mode::Run(self.script)
        }
    }
}

/// 初始化日志系统
///
/// `RUST_LOG` 优先，否则使用配置中的日志级别；输出到 stderr。
fn initialize_logging(config: &LoveConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_filter()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run() -> EngineResult<()> {
    // 携带字节码的可执行文件直接运行，忽略命令行参数
    let embedded = embed::read_current_exe()?;

    let (config_path, cli) = match embedded {
        Some(_) => (None, None),
        None => {
            let cli = Cli::parse();
            (cli.config.clone(), Some(cli))
        }
    };

    let mut config = LoveConfig::load(config_path.as_deref())?;
    initialize_logging(&config);

    let mode = match (embedded, cli) {
        (Some(bytes), _) => Mode::Embedded(bytes),
        (None, Some(cli)) => {
            config.game_loop.headless |= cli.headless;
            if cli.frames.is_some() {
                config.game_loop.max_frames = cli.frames;
            }
            cli.mode()
        }
        (None, None) => Mode::Run(None),
    };

    tracing::info!(target: "app", "lovejs starting");
    let summary = App::new(config).run(mode)?;
    tracing::info!(target: "app", "lovejs finished after {} frames", summary.frames);
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("lovejs: {}", e);
            ExitCode::FAILURE
        }
    }
}
