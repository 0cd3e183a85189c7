use std::env;
use std::path::Path;

use log::error;

pub fn current_dir() -> String {
    match env::current_dir() {
        Ok(dir) => dir.to_string_lossy().into_owned(),
        Err(e) => {
            error!("neosh: env current_dir error: {}", e);
            String::new()
        }
    }
}

/// 把位于 home 目录下的路径缩写为 `~` 开头
pub fn abbreviate_home(path: &str, home: Option<&str>) -> String {
    let Some(home) = home.filter(|h| !h.is_empty()) else {
        return path.to_string();
    };
    match Path::new(path).strip_prefix(home) {
        Ok(rest) if rest.as_os_str().is_empty() => "~".to_string(),
        Ok(rest) => format!("~/{}", rest.display()),
        Err(_) => path.to_string(),
    }
}
