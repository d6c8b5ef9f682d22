//! Shared setup for the cross-service integration suites: free-port
//! allocation and the TOML fragments `master::config` / `slave::config`
//! expect.

use std::net::TcpListener as StdTcpListener;
use std::path::Path;

/// Reserve a free localhost port without holding the socket open. The
/// gap between this call and the real bind is the same race every
/// "ask the OS for port 0" test helper accepts.
pub fn free_port() -> u16 {
    let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

#[allow(clippy::too_many_arguments)]
pub fn master_config_toml(
    tc_addr: &str,
    dlt_addr: &str,
    control_bind: &str,
    file_bind: &str,
    channels: &[u32],
    duration_secs: f64,
    stream_base_port: u16,
    output_dir: &Path,
) -> String {
    format!(
        r#"
        [tc]
        address = "{tc_addr}"

        [dlt]
        command_address = "{dlt_addr}"
        stream_address = "127.0.0.1"
        base_port = {stream_base_port}

        [acquisition]
        channels = {channels:?}
        duration_secs = {duration_secs}
        width_ps = 1000000

        [peer]
        control_bind = "{control_bind}"
        file_bind = "{file_bind}"

        [output]
        directory = "{}"
        "#,
        output_dir.display(),
    )
}

#[allow(clippy::too_many_arguments)]
pub fn slave_config_toml(
    tc_addr: &str,
    dlt_addr: &str,
    master_control_addr: &str,
    master_file_addr: &str,
    stream_base_port: u16,
    output_dir: &Path,
) -> String {
    format!(
        r#"
        [tc]
        address = "{tc_addr}"

        [dlt]
        command_address = "{dlt_addr}"
        stream_address = "127.0.0.1"
        base_port = {stream_base_port}

        [peer]
        master_control_addr = "{master_control_addr}"
        master_file_addr = "{master_file_addr}"

        [output]
        directory = "{}"

        width_ps = 1000000
        "#,
        output_dir.display(),
    )
}
