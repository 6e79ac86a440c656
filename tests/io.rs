// SPDX-License-Identifier: Apache-2.0

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::net::UnixStream;
use pretty_assertions::assert_eq;
use chainbuf::{Buffer, BufferOptions};

fn file_with(content: &[u8]) -> File {
	let mut file = tempfile::tempfile().unwrap();
	file.write_all(content).unwrap();
	file.flush().unwrap();
	file
}

#[test]
fn write_to_socket_round_trips() {
	let (a, b) = UnixStream::pair().unwrap();
	let payload: Vec<u8> = (0..8192u32).map(|i| (i % 251) as u8).collect();

	let mut out = Buffer::new();
	out.add(&payload[..5000]).unwrap();
	out.add(&payload[5000..]).unwrap();
	while !out.is_empty() {
		out.write_to(&a).unwrap();
	}

	let mut inbuf = Buffer::new();
	while inbuf.len() < payload.len() {
		let n = inbuf.read_from(&b, Some(4096)).unwrap();
		assert!(n > 0, "premature EOF");
	}
	let mut got = vec![0; payload.len()];
	inbuf.remove(&mut got).unwrap();
	assert_eq!(got, payload);
}

#[test]
fn read_scatters_across_two_regions() {
	let (a, b) = UnixStream::pair().unwrap();
	let payload = b"0123456789abcdefghij";
	(&a).write_all(payload).unwrap();

	// A small segment with little slack left forces the read to land partly
	// in the tail, partly in a fresh spare.
	let mut buf = Buffer::with_options(BufferOptions::default().set_min_segment(16));
	buf.add(b"0123456789").unwrap();
	buf.drain(10).unwrap();
	buf.add(b"xx").unwrap();
	let read = buf.read_from(&b, Some(payload.len())).unwrap();
	assert_eq!(read, payload.len());

	let mut got = vec![0; 2 + payload.len()];
	buf.remove(&mut got).unwrap();
	assert_eq!(&got[..2], b"xx");
	assert_eq!(&got[2..], payload);
}

#[test]
fn read_from_reports_eof() {
	let (a, b) = UnixStream::pair().unwrap();
	drop(a);
	let mut buf = Buffer::new();
	assert_eq!(buf.read_from(&b, None).unwrap(), 0);
	assert!(buf.is_empty());
}

#[test]
fn file_segment_streams_to_destination() {
	let content: Vec<u8> = (0..10_000u32).map(|i| (i % 241) as u8).collect();
	let src = file_with(&content);
	let mut dst = tempfile::tempfile().unwrap();

	let mut buf = Buffer::new();
	buf.add(b"header:").unwrap();
	buf.add_file(src, 1000, 4000).unwrap();
	buf.add(b":footer").unwrap();
	assert_eq!(buf.len(), 7 + 4000 + 7);

	while !buf.is_empty() {
		buf.write_to(&dst).unwrap();
	}

	let mut written = Vec::new();
	dst.seek(SeekFrom::Start(0)).unwrap();
	dst.read_to_end(&mut written).unwrap();
	let mut expect = b"header:".to_vec();
	expect.extend_from_slice(&content[1000..5000]);
	expect.extend_from_slice(b":footer");
	assert_eq!(written, expect);
}

#[test]
fn file_segment_is_readable_in_place() {
	let content = b"the quick brown fox jumps over the lazy dog".to_vec();
	let src = file_with(&content);
	let mut buf = Buffer::new();
	buf.add_file(src, 4, 11).unwrap();

	let mut peek = [0; 5];
	buf.copy_out(&mut peek).unwrap();
	assert_eq!(&peek, b"quick");
	assert_eq!(buf.len(), 11, "copy_out does not drain");

	let mut out = [0; 11];
	assert_eq!(buf.remove(&mut out).unwrap(), 11);
	assert_eq!(&out, b"quick brown");
	assert!(buf.is_empty());
}

#[test]
fn pullup_materializes_file_bytes() {
	let src = file_with(b"0123456789");
	let mut buf = Buffer::new();
	buf.add(b"mem:").unwrap();
	buf.add_file(src, 2, 6).unwrap();
	let all = buf.pullup_all().unwrap();
	assert_eq!(all, b"mem:234567");
	assert_eq!(buf.len(), 10);
}

#[test]
fn search_spans_file_segments() {
	let src = file_with(b"needle in a haystack");
	let mut buf = Buffer::new();
	buf.add(b"xxx nee").unwrap();
	buf.add_file(src, 3, 10).unwrap();
	// Buffer is "xxx nee" + "dle in a h".
	let found = buf.search(b"needle", None).unwrap().unwrap();
	assert_eq!(found.pos(), 4);
}

#[test]
fn write_atmost_drains_exactly_what_was_written() {
	let (a, b) = UnixStream::pair().unwrap();
	let mut buf = Buffer::new();
	buf.add(b"0123456789").unwrap();
	let written = buf.write_atmost(&a, 4).unwrap();
	assert_eq!(written, 4);
	assert_eq!(buf.len(), 6);

	let mut got = [0; 4];
	(&b).read_exact(&mut got).unwrap();
	assert_eq!(&got, b"0123");
}

#[test]
fn line_round_trips_through_a_socket() {
	let (a, b) = UnixStream::pair().unwrap();
	let mut out = Buffer::new();
	out.add(b"GET / HTTP/1.0\r\nHost: example\r\n").unwrap();
	while !out.is_empty() {
		out.write_to(&a).unwrap();
	}

	let mut inbuf = Buffer::new();
	let mut request = None;
	while request.is_none() {
		assert!(inbuf.read_from(&b, None).unwrap() > 0, "premature EOF");
		request = inbuf.read_line(chainbuf::LineStyle::Crlf).unwrap();
	}
	assert_eq!(request.unwrap(), b"GET / HTTP/1.0");
	assert_eq!(
		inbuf.read_line(chainbuf::LineStyle::Crlf).unwrap().unwrap(),
		b"Host: example"
	);
}
