use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use lattice_core::packet::network::{NetworkMessage, NetworkPacket, Ping};
use lattice_core::{DhtSource, Frame, FrameView, FrameWriter};
use std::net::Ipv4Addr;

fn nested_frame(payload_size: usize, children: usize) -> Frame {
    let mut root = Frame::leaf(0x10, vec![0xAA; payload_size]);
    for i in 0..children {
        let tag = u8::try_from(i % 250).unwrap_or(0) + 1;
        root.push_child(
            Frame::new(tag)
                .with_child(Frame::leaf(0x01, vec![0x42; 8]))
                .with_child(Frame::marker(0x02)),
        );
    }
    root
}

fn bench_frame_encode(c: &mut Criterion) {
    let sizes: Vec<(usize, &str)> = vec![
        (64, "64_bytes"),
        (512, "512_bytes"),
        (1200, "1200_bytes"),
    ];

    let mut group = c.benchmark_group("frame_encode");
    for (size, name) in sizes {
        let frame = nested_frame(size, 8);
        group.throughput(Throughput::Bytes(frame.encoded_len() as u64));
        group.bench_function(name, |b| b.iter(|| black_box(&frame).encode()));
    }
    group.finish();
}

fn bench_frame_decode(c: &mut Criterion) {
    let bytes = nested_frame(1200, 16).encode();

    let mut group = c.benchmark_group("frame_decode");
    group.throughput(Throughput::Bytes(bytes.len() as u64));

    group.bench_function("owned_tree", |b| {
        b.iter(|| Frame::decode(black_box(&bytes)))
    });

    group.bench_function("view_walk_children", |b| {
        b.iter(|| {
            let view = FrameView::parse(black_box(&bytes)).ok()?;
            Some(view.children().filter_map(Result::ok).count())
        })
    });

    group.finish();
}

fn bench_shared_writer(c: &mut Criterion) {
    let writer = FrameWriter::with_capacity(2048);
    let frame = nested_frame(512, 4);

    c.bench_function("frame_writer_write", |b| {
        b.iter(|| writer.write_with(black_box(&frame), <[u8]>::len))
    });
}

fn bench_network_packet(c: &mut Criterion) {
    let ping = NetworkMessage::Ping(Ping {
        source: DhtSource {
            peer_id: 42,
            tcp_port: 6881,
            udp_port: 6881,
            ..DhtSource::default()
        },
        remote_ip: Some(Ipv4Addr::new(203, 0, 113, 7)),
    });
    let bytes = NetworkPacket::wrap(42, &ping).encode();

    let mut group = c.benchmark_group("network_packet");
    group.bench_function("encode_ping", |b| {
        b.iter(|| NetworkPacket::wrap(42, black_box(&ping)).encode())
    });
    group.bench_function("decode_ping", |b| {
        b.iter(|| {
            NetworkPacket::decode(black_box(&bytes)).and_then(|packet| packet.message())
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_frame_encode,
    bench_frame_decode,
    bench_shared_writer,
    bench_network_packet
);
criterion_main!(benches);
