// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::io::{self, Read, Write};
use crate::Buffer;

impl Read for Buffer {
	/// Reads with [`remove`](Buffer::remove) semantics: bytes are copied out
	/// of the front and drained.
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		Ok(self.remove(buf)?)
	}
}

impl Write for Buffer {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		self.add(buf)?;
		Ok(buf.len())
	}

	fn flush(&mut self) -> io::Result<()> { Ok(()) }
}

impl fmt::Write for Buffer {
	fn write_str(&mut self, s: &str) -> fmt::Result {
		self.add(s.as_bytes()).map_err(|_| fmt::Error)
	}
}
