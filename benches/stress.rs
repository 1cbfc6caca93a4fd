use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use ulid::Ulid;

use salonbook::config::EngineConfig;
use salonbook::engine::Engine;
use salonbook::model::*;
use salonbook::observability;
use salonbook::tenant::TenantManager;

const SLOT: Minute = 30;

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

fn first_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
}

/// Open seven days a week, 08:00–20:00, so every slot of every date is bookable.
async fn add_staff(engine: &Engine) -> StaffId {
    let sid = Ulid::new();
    engine
        .upsert_staff(StaffSchedule {
            staff_id: sid,
            name: Some(format!("bench-{sid}")),
            working_days: WorkingDays::from_days(&[
                chrono::Weekday::Mon,
                chrono::Weekday::Tue,
                chrono::Weekday::Wed,
                chrono::Weekday::Thu,
                chrono::Weekday::Fri,
                chrono::Weekday::Sat,
                chrono::Weekday::Sun,
            ]),
            working_hours: Span::new(hm(8, 0), hm(20, 0)),
            break_window: None,
            status: StaffStatus::Active,
        })
        .await
        .unwrap();
    sid
}

fn slots_per_day() -> u32 {
    (hm(20, 0) - hm(8, 0)) / SLOT
}

/// The `i`-th back-to-back slot, rolling over to the next date when a day fills.
fn slot(i: u32) -> (NaiveDate, Minute) {
    let date = first_day() + Days::new(u64::from(i / slots_per_day()));
    (date, hm(8, 0) + (i % slots_per_day()) * SLOT)
}

fn line() -> Vec<ServiceLineItem> {
    vec![ServiceLineItem::new("Cut", Decimal::from(20), SLOT)]
}

async fn phase1_sequential(engine: &Engine) {
    let sid = add_staff(engine).await;
    let n = 2000;
    let mut latencies = Vec::with_capacity(n as usize);
    let start = Instant::now();

    for i in 0..n {
        let (date, at) = slot(i);
        let t = Instant::now();
        engine.book(sid, date, at, Ulid::new(), line()).await.unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = f64::from(n) / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("book latency", &mut latencies);
}

async fn phase2_concurrent(engine: &Arc<Engine>) {
    let n_tasks = 10;
    let n_per_task = 200;

    let start = Instant::now();
    let mut handles = Vec::new();
    for _ in 0..n_tasks {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            // One staff member per task: no contention, WAL batching only.
            let sid = add_staff(&engine).await;
            for j in 0..n_per_task {
                let (date, at) = slot(j);
                engine.book(sid, date, at, Ulid::new(), line()).await.unwrap();
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    let ops = f64::from(total) / elapsed.as_secs_f64();
    println!(
        "  {n_tasks} tasks x {n_per_task} bookings = {total} total in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
}

async fn phase3_contended(engine: &Arc<Engine>) {
    let sid = add_staff(engine).await;
    let n_tasks = 8;
    let n_slots = 100;

    // Every task races for the same slots; exactly one booking per slot may win.
    let start = Instant::now();
    let mut handles = Vec::new();
    for _ in 0..n_tasks {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let (mut won, mut conflicted, mut busy) = (0u32, 0u32, 0u32);
            for i in 0..n_slots {
                let (date, at) = slot(i);
                match engine.book(sid, date, at, Ulid::new(), line()).await {
                    Ok(_) => won += 1,
                    Err(e) if e.conflicts().is_some() => conflicted += 1,
                    Err(_) => busy += 1,
                }
            }
            (won, conflicted, busy)
        }));
    }

    let (mut won, mut conflicted, mut busy) = (0, 0, 0);
    for h in handles {
        let (w, c, b) = h.await.unwrap();
        won += w;
        conflicted += c;
        busy += b;
    }
    println!(
        "  {n_tasks} tasks racing for {n_slots} slots in {:.2}s: {won} booked, {conflicted} conflicts, {busy} contention",
        start.elapsed().as_secs_f64()
    );
    assert_eq!(won, n_slots, "each slot must be booked exactly once");
}

async fn phase4_read_under_load(engine: &Arc<Engine>) {
    let reader_sid = add_staff(engine).await;
    for i in 0..200 {
        let (date, at) = slot(i);
        engine
            .book(reader_sid, date, at, Ulid::new(), line())
            .await
            .unwrap();
    }

    let stop = Arc::new(AtomicBool::new(false));
    let mut writer_handles = Vec::new();
    for _ in 0..5 {
        let engine = engine.clone();
        let stop = stop.clone();
        writer_handles.push(tokio::spawn(async move {
            let sid = add_staff(&engine).await;
            let mut i = 0;
            while !stop.load(Ordering::Relaxed) {
                let (date, at) = slot(i);
                let _ = engine.book(sid, date, at, Ulid::new(), line()).await;
                i += 1;
            }
        }));
    }

    let n_readers = 10;
    let reads_per_reader = 500;
    let mut reader_handles = Vec::new();
    for r in 0..n_readers {
        let engine = engine.clone();
        reader_handles.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for i in 0..reads_per_reader {
                let date = first_day() + Days::new(((r + i) % 8) as u64);
                let t = Instant::now();
                if i % 2 == 0 {
                    engine.free_slots(reader_sid, date, Some(SLOT)).await.unwrap();
                } else {
                    engine
                        .find_conflicts(reader_sid, date, hm(9, 0), hm(11, 0), None)
                        .await
                        .unwrap();
                }
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all = Vec::new();
    for h in reader_handles {
        all.extend(h.await.unwrap());
    }
    stop.store(true, Ordering::Relaxed);
    for h in writer_handles {
        h.await.unwrap();
    }
    print_latency("read latency (free_slots / find_conflicts)", &mut all);
}

async fn phase5_moves(engine: &Arc<Engine>) {
    let from = add_staff(engine).await;
    let to = add_staff(engine).await;
    let n = 500;

    let mut ids = Vec::with_capacity(n as usize);
    for i in 0..n {
        let (date, at) = slot(i);
        ids.push(engine.book(from, date, at, Ulid::new(), line()).await.unwrap().id);
    }

    let mut latencies = Vec::with_capacity(ids.len());
    for (i, id) in ids.iter().enumerate() {
        let (date, at) = slot(i as u32);
        let t = Instant::now();
        engine.move_appointment(*id, to, date, at).await.unwrap();
        latencies.push(t.elapsed());
    }
    print_latency("cross-staff move latency", &mut latencies);
}

#[tokio::main]
async fn main() {
    observability::init_tracing();
    let config = EngineConfig::from_env();
    if let Err(e) = observability::init(config.metrics_port) {
        eprintln!("metrics exporter not installed: {e}");
    }

    let dir = std::env::temp_dir().join(format!("salonbook_bench_{}", Ulid::new()));
    let tm = TenantManager::new(config.with_data_dir(&dir));

    println!("=== salonbook stress benchmark ===");
    println!("data dir: {}\n", dir.display());

    println!("[phase 1] sequential booking throughput");
    phase1_sequential(&tm.get_or_create("phase1").unwrap()).await;

    println!("\n[phase 2] concurrent booking throughput");
    phase2_concurrent(&tm.get_or_create("phase2").unwrap()).await;

    println!("\n[phase 3] contended slots");
    phase3_contended(&tm.get_or_create("phase3").unwrap()).await;

    println!("\n[phase 4] read latency under write load");
    phase4_read_under_load(&tm.get_or_create("phase4").unwrap()).await;

    println!("\n[phase 5] moves");
    phase5_moves(&tm.get_or_create("phase5").unwrap()).await;

    let _ = std::fs::remove_dir_all(&dir);
    println!("\n=== benchmark complete ===");
}
