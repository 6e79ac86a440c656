// SPDX-License-Identifier: Apache-2.0

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use chainbuf::Buffer;

const CHUNK: &[u8] = &[0x5a; 700];

fn add_drain(c: &mut Criterion) {
	c.bench_function("add_drain", |b| {
		b.iter(|| {
			let mut buf = Buffer::new();
			for _ in 0..64 {
				buf.add(black_box(CHUNK)).unwrap();
			}
			buf.drain(buf.len()).unwrap();
			buf
		})
	});
}

fn add_buffer_relink(c: &mut Criterion) {
	c.bench_function("add_buffer_relink", |b| {
		b.iter(|| {
			let mut dst = Buffer::new();
			for _ in 0..16 {
				let mut src = Buffer::new();
				src.add(black_box(CHUNK)).unwrap();
				dst.add_buffer(&mut src).unwrap();
			}
			dst
		})
	});
}

fn search_fragmented(c: &mut Criterion) {
	let mut buf = Buffer::new();
	for _ in 0..64 {
		buf.add_reference(&CHUNK[..13], || {}).unwrap();
	}
	buf.add_reference(b"needle".as_slice(), || {}).unwrap();
	c.bench_function("search_fragmented", |b| {
		b.iter(|| buf.search(black_box(b"needle"), None).unwrap())
	});
}

criterion_group!(benches, add_drain, add_buffer_relink, search_fragmented);
criterion_main!(benches);
