//! Wire framing and message building for the iOS debugger channel (§6, §4.7's iOS refresh
//! strategy), built in the same blocking, `Result`-returning style as `device.rs::RealDevice`.
//!
//! Each frame: a 4-byte big-endian payload length, followed by that many bytes of UTF-16-LE
//! JSON (a Chrome DevTools Protocol message). Reproduced exactly for wire compatibility with the
//! inspector.
use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::io::{Read, Write};

pub const DEBUGGER_PORT: u16 = 18181;

/// Blanket marker so `LiveSyncCoordinator` can hold a boxed socket without naming its concrete
/// type (a real `TcpStream` in production, a `Cursor` in tests).
pub trait ReadWrite: Read + Write + Send {}
impl<T: Read + Write + Send> ReadWrite for T {}

pub fn write_frame<W: Write>(writer: &mut W, payload: &str) -> Result<()> {
    let mut bytes = Vec::with_capacity(payload.len() * 2);
    for unit in payload.encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    let len: u32 = bytes
        .len()
        .try_into()
        .context("Debugger payload exceeds 4GiB frame limit")?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(&bytes)?;
    Ok(())
}

pub fn read_frame<R: Read>(reader: &mut R) -> Result<String> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    if len % 2 != 0 {
        bail!("Debugger frame length {} is not a whole number of UTF-16 code units", len);
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    let units: Vec<u16> = payload.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
    String::from_utf16(&units).context("Debugger frame payload is not valid UTF-16")
}

/// A connection to the inspector socket (real `TcpStream` in production, any `Read + Write` in
/// tests). Owns the per-message id counter the CDP wire protocol requires.
pub struct DebuggerConnection<S> {
    stream: S,
    next_id: u64,
}

impl<S: Read + Write> DebuggerConnection<S> {
    pub fn new(stream: S) -> DebuggerConnection<S> {
        DebuggerConnection { stream, next_id: 1 }
    }

    fn send(&mut self, method: &str, params: Value) -> Result<()> {
        let message = serde_json::json!({ "id": self.next_id, "method": method, "params": params });
        self.next_id += 1;
        let payload = serde_json::to_string(&message).context("Serializing debugger message")?;
        write_frame(&mut self.stream, &payload)
    }

    pub fn set_script_source(&mut self, script_url: &str, source: &str) -> Result<()> {
        self.send(
            "Debugger.setScriptSource",
            serde_json::json!({ "scriptId": script_url, "scriptSource": source }),
        )
    }

    pub fn reload(&mut self) -> Result<()> {
        self.send("Page.reload", serde_json::json!({}))
    }
}
