mod cli;

use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind;
use cli::Cli;

fn main() -> ExitCode {
    env_logger::init();

    // 用法错误也以 1 退出
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            err.exit()
        }
        Err(err) => {
            let _ = err.print();
            return ExitCode::FAILURE;
        }
    };

    match ux_mkfs::mkfs(&cli.device, cli.create) {
        Ok(stat) => {
            println!(
                "{}: uxfs with {} free inodes, {} free blocks",
                cli.device.display(),
                stat.free_inodes,
                stat.free_blocks
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("ux-mkfs: {}: {err}", cli.device.display());
            ExitCode::FAILURE
        }
    }
}
