use super::{Chunks, ChunksError};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    Chunks(ChunksError),
    InvalidPayload,
}

/// Reads the `data` payloads of server-sent events from a chunk stream.
///
/// Comment lines (OpenRouter sends `: OPENROUTER PROCESSING` while the
/// upstream model warms up) and the `event`, `id` and `retry` fields are
/// skipped. Multiple `data` lines in one event are joined with `\n`.
pub struct Sse {
    buf: String,
    chunks: Chunks,
    pending_bytes: Vec<u8>,
}

impl Sse {
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            buf: String::new(),
            chunks,
            pending_bytes: vec![],
        }
    }

    pub async fn next_event(&mut self) -> Result<Option<String>, Error> {
        loop {
            if let Some(data) = self.take_event()? {
                return Ok(Some(data));
            }

            let Some(bytes) =
                self.chunks.next_chunk().await.map_err(Error::Chunks)?
            else {
                // An unterminated trailing event is dropped.
                return Ok(None);
            };
            self.push_bytes(&bytes)?;
        }
    }

    fn push_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        // A chunk boundary may split a multi-byte character.
        self.pending_bytes.extend_from_slice(bytes);
        let valid_up_to = match str::from_utf8(&self.pending_bytes) {
            Ok(s) => s.len(),
            Err(err) if err.error_len().is_none() => err.valid_up_to(),
            Err(_) => return Err(Error::InvalidPayload),
        };
        let rest = self.pending_bytes.split_off(valid_up_to);
        let text = String::from_utf8(std::mem::replace(
            &mut self.pending_bytes,
            rest,
        ))
        .map_err(|_| Error::InvalidPayload)?;
        self.buf.push_str(&text.replace("\r\n", "\n"));
        Ok(())
    }

    /// Pops complete events off the buffer until one carries data.
    fn take_event(&mut self) -> Result<Option<String>, Error> {
        while let Some(end) = self.buf.find("\n\n") {
            let block: String = self.buf.drain(..end + 2).collect();
            let mut data: Option<String> = None;
            for line in block.lines() {
                if line.is_empty() || line.starts_with(':') {
                    continue;
                }
                let (field, value) = match line.split_once(':') {
                    Some((field, value)) => {
                        (field, value.strip_prefix(' ').unwrap_or(value))
                    }
                    None => (line, ""),
                };
                match field {
                    "data" => {
                        let data = data.get_or_insert_default();
                        if !data.is_empty() {
                            data.push('\n');
                        }
                        data.push_str(value);
                    }
                    "event" | "id" | "retry" => {}
                    _ => return Err(Error::InvalidPayload),
                }
            }
            if data.is_some() {
                return Ok(data);
            }
        }
        Ok(None)
    }
}
