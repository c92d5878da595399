//! Startup banner for the chat relay.

use std::net::SocketAddr;

/// Relay configuration for display in the startup banner.
pub struct BannerInfo<'a> {
    pub generator: &'a str,
    pub model: &'a str,
    pub api_key: &'a str,
    pub listen: SocketAddr,
}

/// Show only the last four characters of a secret.
pub fn redact_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{tail}")
}

pub fn render_banner(info: &BannerInfo) -> String {
    format!(
        r#"
   ╔═══════════════════════════════════════╗
   ║           F A R M H A N D             ║
   ║    farming questions, relayed         ║
   ╚═══════════════════════════════════════╝

   version   {}
   backend   {} ({})
   api key   {}
   listen    http://{}
"#,
        env!("CARGO_PKG_VERSION"),
        info.generator,
        info.model,
        redact_key(info.api_key),
        info.listen,
    )
}

/// Print the startup banner with relay info.
pub fn print_banner(info: &BannerInfo) {
    println!("{}", render_banner(info));
}
