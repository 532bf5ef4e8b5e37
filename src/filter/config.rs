/// Options for the pre-probe smart filter.
#[derive(Debug, Clone)]
pub struct Config {
    /// Run the filter at all; when disabled every record passes.
    pub enabled: bool,
    /// Address prefixes treated as private or loopback.
    pub private_prefixes: Vec<String>,
    /// Well-known service ports that are never proxies.
    pub denied_ports: Vec<u16>,
    /// Lowest acceptable port (inclusive).
    pub min_port: u16,
    /// Upper port bound (exclusive).
    pub max_port: u16,
    /// Minimum number of characters in the identity string.
    pub min_identity_len: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            private_prefixes: ["127.", "10.", "172.", "192.168."]
                .into_iter()
                .map(String::from)
                .collect(),
            denied_ports: vec![
                22, 23, 25, 53, 80, 110, 143, 993, 995, 3389, 5432, 6379, 27017,
            ],
            min_port: 1024,
            max_port: 65535,
            min_identity_len: 10,
        }
    }
}
