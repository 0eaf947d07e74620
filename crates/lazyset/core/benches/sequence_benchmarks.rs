// Lazyset
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use lazyset_core::{OperationRegistry, Seq, SequenceOptions, Value};

fn benchmark_indexed_access(c: &mut Criterion) {
    let mut group = c.benchmark_group("indexed_access");

    for index in [10i64, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("uncached", index), &index, |b, &index| {
            let seq = Seq::counter_from(0);
            b.iter(|| seq.get(black_box(index)).unwrap())
        });

        group.bench_with_input(BenchmarkId::new("memo", index), &index, |b, &index| {
            let seq = Seq::counter_from(0).configure(SequenceOptions::memo());
            b.iter(|| seq.get(black_box(index)).unwrap())
        });

        group.bench_with_input(BenchmarkId::new("window", index), &index, |b, &index| {
            let seq = Seq::counter_from(0).configure(SequenceOptions::cached(256));
            b.iter(|| seq.get(black_box(index)).unwrap())
        });
    }

    group.finish();
}

fn benchmark_dispatch(c: &mut Criterion) {
    let registry = OperationRegistry::with_builtins();
    let values = Value::list(0..1000i64);
    let mut group = c.benchmark_group("dispatch");

    group.bench_function("scalar_add", |b| b.iter(|| registry.call("add", black_box(&[Value::Int(5), Value::Int(3)])).unwrap()));
    group.bench_function("broadcast_sum", |b| {
        b.iter(|| {
            let shifted = registry.call_on(black_box(&values), "add", &[Value::Int(1)]).unwrap();
            registry.call_on(&shifted, "sum", &[]).unwrap()
        })
    });

    group.finish();
}

criterion_group!(sequence_benches, benchmark_indexed_access, benchmark_dispatch);
criterion_main!(sequence_benches);
