use std::time::Duration;

use serline::{PortBuilder, ReadMode};

fn main() {
    env_logger::init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| String::from("/dev/ttyUSB0"));

    let result = PortBuilder::new(&path)
        .baud(9600)
        .read_timeout(Duration::from_secs(2))
        .open_scoped(|port| port.write_read(b"AT\r\n", None, ReadMode::All));

    match result {
        Ok(Some(reply)) => println!("{}", String::from_utf8_lossy(&reply)),
        Ok(None) => println!("no response from {}", path),
        Err(e) => eprintln!("{}: {}", path, e),
    }
}
