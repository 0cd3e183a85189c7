use log::debug;
use neosh::shell::Shell;
use neosh::utils::config::Config;
use neosh::utils::log::init_logger;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::new();
    if let Err(e) = init_logger(&config) {
        eprintln!("neosh: 无法初始化日志: {}", e);
    }
    debug!("配置加载成功 {}", config.config_dir.display());

    let status = {
        let mut shell = Shell::new(&config)?;
        shell.run()?
    };
    std::process::exit(status)
}
