const GREEN: &str = "\x1b[32m";
const CYAN: &str = "\x1b[36m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";
const DIM: &str = "\x1b[2m";

macro_rules! env_or {
    ($key:literal, $default:literal) => {
        option_env!($key).unwrap_or($default)
    };
}

pub struct BannerInfo {
    pub version: &'static str,
    pub build_time: &'static str,
    pub commit_short: &'static str,
    pub rust_version: &'static str,
    pub dirty: bool,
    pub profile: &'static str,
}

impl Default for BannerInfo {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            build_time: env_or!("BUILD_TIME_HUMAN", "unknown"),
            commit_short: env_or!("GIT_COMMIT_SHORT", "unknown"),
            rust_version: env_or!("RUST_VERSION", "unknown"),
            dirty: matches!(option_env!("GIT_DIRTY"), Some("true")),
            profile: if cfg!(debug_assertions) {
                "debug"
            } else {
                "release"
            },
        }
    }
}

/// What the banner reports about the configured endpoints.
pub struct Endpoints<'a> {
    pub mixer: Option<&'a str>,
    pub lighting: Option<&'a str>,
}

pub fn print_banner(info: &BannerInfo, endpoints: &Endpoints<'_>) {
    println!();
    println!("{GREEN}     _                   _ _       _    {RESET}");
    println!("{GREEN}  __| |__   _____      _| (_)_ __ | | __{RESET}");
    println!("{GREEN} / _` '_ \\ / _ \\ \\ /\\ / / | | '_ \\| |/ /{RESET}");
    println!("{GREEN} \\__ \\ | | | (_) \\ V  V /| | | | | |   < {RESET}");
    println!("{GREEN} |___/_| |_|\\___/ \\_/\\_/ |_|_|_| |_|_|\\_\\{RESET}");
    println!("{DIM}========================================={RESET}");
    println!();

    print_row("Version", info.version, CYAN);
    print_row("Build time", info.build_time, RESET);

    let commit = if info.dirty {
        format!("{}{YELLOW} (dirty){RESET}", info.commit_short)
    } else {
        info.commit_short.to_owned()
    };
    print_row("Commit", &commit, RESET);
    print_row("Rust", info.rust_version, RESET);
    print_row("Profile", info.profile, YELLOW);
    println!();

    print_row("Mixer", endpoints.mixer.unwrap_or("disabled"), CYAN);
    print_row("Lighting", endpoints.lighting.unwrap_or("disabled"), CYAN);
    println!();
    println!("{DIM}  Standing by for {BOLD}GO{RESET}");
    println!();
}

fn print_row(label: &str, value: &str, color: &str) {
    println!("  {BOLD}{label:<14}{RESET}{color}{value}{RESET}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn build_time_is_minute_precision_utc() {
        let info = BannerInfo::default();
        let pattern = Regex::new(r"^\d{4}-(0[1-9]|1[0-2])-(0[1-9]|[12]\d|3[01]) ([01]\d|2[0-3]):[0-5]\d UTC$")
            .unwrap();
        assert!(pattern.is_match(info.build_time), "{}", info.build_time);
    }
}
