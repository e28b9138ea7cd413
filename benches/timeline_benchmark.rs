use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::path::PathBuf;
use threadreel::audio::AudioClip;
use threadreel::budget::{BudgetAllocator, BudgetPolicy, TimelineSlot};
use threadreel::captions::SubtitleAligner;
use threadreel::config::{BudgetConfig, CaptionConfig};
use threadreel::narration::{NarrationSegment, SegmentRole, WordTiming};

fn create_slots(count: usize) -> Vec<TimelineSlot<NarrationSegment>> {
    let mut offset = 0.0;
    (0..count)
        .map(|i| {
            let words: Vec<WordTiming> = (0..30)
                .map(|w| WordTiming {
                    token: format!("word{}", w),
                    start: w as f64 * 0.3,
                    end: w as f64 * 0.3 + 0.25,
                })
                .collect();
            let body: Vec<&str> = words.iter().map(|w| w.token.as_str()).collect();
            let segment = NarrationSegment {
                role: SegmentRole::Comment(i),
                text: format!("user{}: {}", i, body.join(" ")),
                spoken: body.join(" "),
                audio_path: PathBuf::from("segment.wav"),
                clip: AudioClip::silence(0.0, 44100, 2),
                duration: 9.0,
                words,
                timing_degraded: false,
            };
            let slot = TimelineSlot {
                segment,
                offset,
                color_index: i,
            };
            offset += 9.5;
            slot
        })
        .collect()
}

fn bench_allocation(c: &mut Criterion) {
    let policy = BudgetPolicy::new(&BudgetConfig::default(), 0.4);
    let allocator = BudgetAllocator::new(policy);
    let durations: Vec<f64> = (0..200).map(|i| 1.0 + (i % 7) as f64 * 0.35).collect();

    c.bench_function("allocate_200_candidates", |b| {
        b.iter(|| allocator.allocate(black_box(Some(3.2)), black_box(durations.clone())))
    });
}

fn bench_alignment(c: &mut Criterion) {
    let config = CaptionConfig::default();
    let aligner = SubtitleAligner::new(&config);
    let slots = create_slots(12);

    c.bench_function("align_12_segments", |b| {
        b.iter(|| aligner.align_all(black_box(&slots)))
    });
}

criterion_group!(benches, bench_allocation, bench_alignment);
criterion_main!(benches);
