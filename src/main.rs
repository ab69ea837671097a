use clap::Parser;
use vaultpack::cli::{self, Cli, Commands};

fn main() -> anyhow::Result<()> {
    // 解析命令行参数
    let cli = Cli::parse();

    // 初始化日志
    vaultpack::init(cli.verbose)?;

    // 执行命令
    match cli.command {
        Commands::Build(args) => cli::commands::build(&cli.config, args),
        Commands::Show(args) => cli::commands::show(&cli.config, args),
        Commands::Links(args) => cli::commands::links(&cli.config, args),
    }
}
