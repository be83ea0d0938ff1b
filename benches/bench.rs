use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use medindex::dicom::write_file;
use medindex::storage::memory::MemoryStorageConfig;
use medindex::storage::{StorageConfig, StorageFactory};
use medindex::{AttributeSet, EngineConfig, IndexEngine, IngestItem, MemoryItem, Tag, VR};

fn generate_instance(i: usize) -> Vec<u8> {
    let mut item = AttributeSet::new();
    item.put_str(Tag(0x0008, 0x1155), VR::UI, &format!("1.2.3.{i}.1"))
        .put_str(Tag(0x0008, 0x1150), VR::UI, "1.2.840.10008.5.1.4.1.1.2");

    let mut set = AttributeSet::new();
    set.put_str(Tag::SOP_CLASS_UID, VR::UI, "1.2.840.10008.5.1.4.1.1.2")
        .put_str(Tag::SOP_INSTANCE_UID, VR::UI, &format!("1.2.3.{i}"))
        .put_str(Tag::MODALITY, VR::CS, if i % 2 == 0 { "CT" } else { "MR" })
        .put_str(Tag(0x0010, 0x0010), VR::PN, &format!("PATIENT^{}", i % 97))
        .put_str(Tag(0x0008, 0x0020), VR::DA, &format!("2010{:02}15", i % 12 + 1))
        .put_str(Tag(0x0008, 0x0070), VR::LO, "ACME")
        .put_u16(Tag(0x0028, 0x0010), 512)
        .put_u16(Tag(0x0028, 0x0011), 512)
        .put_str(Tag(0x0018, 0x0050), VR::DS, &format!("{}.5", i % 5))
        .put_sequence(Tag(0x0008, 0x1140), vec![item]);

    let mut bytes = Vec::new();
    write_file(&set, &mut bytes).unwrap();
    bytes
}

fn generate_items(count: usize) -> Vec<Arc<dyn IngestItem>> {
    (0..count)
        .map(|i| {
            Arc::new(MemoryItem::new(
                format!("mem:///bench/{i}.dcm"),
                generate_instance(i),
            )) as Arc<dyn IngestItem>
        })
        .collect()
}

fn engine() -> IndexEngine {
    let storage = StorageFactory::create(StorageConfig::Memory(MemoryStorageConfig::default()))
        .unwrap();
    IndexEngine::with_storage(
        storage,
        EngineConfig::builder().index_all_modalities().build(),
    )
    .unwrap()
}

fn bench_index_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("Index Batch");
    group.sample_size(10);

    for count in [100, 1000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let items = generate_items(count);
            b.iter(|| {
                let engine = engine();
                let report = engine.index_batch(&items);
                assert_eq!(report.indexed as usize, count);
            })
        });
    }
    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("Query");
    let engine = engine();
    engine.index_batch(&generate_items(5000));

    for query in [
        "Modality:ct",
        "PatientName:patient AND StudyDate:[20100301 TO 20100630]",
        "SliceThickness:Float:[1 TO 3]",
        "acme",
    ] {
        group.bench_with_input(BenchmarkId::from_parameter(query), query, |b, query| {
            b.iter(|| engine.query(query, &["PatientName", "Rows"]).unwrap().count())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_index_batch, bench_query);
criterion_main!(benches);
