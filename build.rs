use std::env;
use std::fs;
use std::path::Path;

fn main() {
    // Create config template if it doesn't exist
    let out_dir = env::var("OUT_DIR").unwrap_or_else(|_| "./".to_string());
    let template_path = Path::new(&out_dir).join("../../../config.template.toml");

    let template = r#"# TSMERGE Configuration Template
# Copy this file to 'config.toml' and adjust the values as needed

# Number of TS packets inspected before signature extraction gives up
scan_packet_budget = 1500

# Copy buffer size in bytes used by the merge worker
copy_buffer_size = 262144

# Consecutive in-sync packets required to accept a stream alignment
min_sync_run = 4
"#;

    let _ = fs::write(template_path, template);
    println!("cargo:rerun-if-changed=build.rs");
}
