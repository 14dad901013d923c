//! 로그 파서 벤치마크
//!
//! standard, rfc3164, rfc5424 형식과 무형식 라인의 파싱 처리량을 측정합니다.

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use palisade_core::types::RawMessage;
use palisade_pipeline::EventParser;

/// standard 형식 (pid 포함 태그)
const STANDARD: &str = "<134>Oct 11 22:14:15 mymachine su[1234]: bad password";

/// RFC 3164 형식 (pid 없는 태그)
const RFC3164: &str = "<34>Jan 15 12:00:00 myhost sshd: Failed password for root";

/// RFC 5424 형식
const RFC5424: &str = "<165>1 2024-01-15T12:00:00.000Z web-01 nginx 5678 ID47 - request processed";

/// 어느 형식에도 매칭되지 않는 라인
const UNMATCHED: &str = "free-form application output without syslog framing";

fn raw(line: &str) -> RawMessage {
    RawMessage {
        line: line.to_owned(),
        source_ip: "10.0.0.1".parse().unwrap(),
        source_port: 514,
        received_at: Utc::now(),
    }
}

fn bench_single_format(c: &mut Criterion) {
    let parser = EventParser::new().unwrap();

    let mut group = c.benchmark_group("parse_single");
    group.throughput(Throughput::Elements(1));

    for (name, line) in [
        ("standard", STANDARD),
        ("rfc3164", RFC3164),
        ("rfc5424", RFC5424),
        ("unmatched", UNMATCHED),
    ] {
        let message = raw(line);
        group.bench_with_input(BenchmarkId::new("format", name), &message, |b, input| {
            b.iter(|| parser.parse(black_box(input)))
        });
    }

    group.finish();
}

fn bench_throughput(c: &mut Criterion) {
    let parser = EventParser::new().unwrap();
    let message = raw(STANDARD);

    let mut group = c.benchmark_group("parse_throughput");
    group.throughput(Throughput::Elements(1000));

    group.bench_function("standard_1000", |b| {
        b.iter(|| {
            for _ in 0..1000 {
                parser.parse(black_box(&message));
            }
        })
    });

    // 무형식 라인은 세 패턴을 모두 시도한 뒤 실패하는 최악 경로
    let unmatched = raw(UNMATCHED);
    group.bench_function("unmatched_1000", |b| {
        b.iter(|| {
            for _ in 0..1000 {
                parser.parse(black_box(&unmatched));
            }
        })
    });

    group.finish();
}

criterion_group!(benches, bench_single_format, bench_throughput);
criterion_main!(benches);
