use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use color_eyre::Result;
use color_eyre::eyre::eyre;

use super::{SignInterface, SignObject, allocate_command, run_sequence_command};

/// Wrap a command payload in the Alphasign packet framing: sync nulls, SOH,
/// type code "Z" (all signs), address "00" (broadcast), STX, payload, EOT.
fn packet(payload: &str) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + 10);
    frame.extend_from_slice(b"\x00\x00\x00\x00\x00");
    frame.extend_from_slice(b"\x01Z00\x02");
    frame.extend_from_slice(payload.as_bytes());
    frame.push(0x04);
    frame
}

/// Sign transport over a serial device node
pub struct SerialSign {
    device: PathBuf,
    port: Option<File>,
}

impl SerialSign {
    pub fn new(device: impl Into<PathBuf>) -> Self {
        Self {
            device: device.into(),
            port: None,
        }
    }

    fn send(&mut self, payload: &str) -> Result<()> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| eyre!("sign is not connected"))?;

        port.write_all(&packet(payload))?;
        port.flush()?;
        Ok(())
    }
}

impl SignInterface for SerialSign {
    fn connect(&mut self) -> Result<()> {
        if self.port.is_none() {
            let port = OpenOptions::new().write(true).open(&self.device)?;
            log::debug!("opened sign device {}", self.device.display());
            self.port = Some(port);
        }
        Ok(())
    }

    fn disconnect(&mut self) {
        self.port = None;
    }

    fn clear_memory(&mut self) -> Result<()> {
        self.send("E$")
    }

    fn allocate(&mut self, objects: &[SignObject]) -> Result<()> {
        self.send(&allocate_command(objects))
    }

    fn set_run_sequence(&mut self, objects: &[SignObject]) -> Result<()> {
        self.send(&run_sequence_command(objects))
    }

    fn write(&mut self, object: &SignObject) -> Result<()> {
        for frame in object.frames() {
            self.send(&frame)?;
        }
        Ok(())
    }
}
