use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Days, NaiveDate};
use rust_decimal_macros::dec;
use ulid::Ulid;

use staylock::config::EngineConfig;
use staylock::directory::InMemoryDirectory;
use staylock::engine::{BookingError, Engine};
use staylock::model::{BookingRequest, ListingPolicy, Stay};
use staylock::notify::NotifyHub;

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
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

fn listing_policy(id: Ulid) -> ListingPolicy {
    ListingPolicy {
        id,
        nightly_rate: dec!(120.00),
        minimum_stay: 1,
        maximum_stay: None,
        max_guests: 6,
        service_fee_rate: dec!(0.12),
        currency: "USD".into(),
        active: true,
        approved: true,
    }
}

fn request(listing_id: Ulid, check_in: NaiveDate, nights: u64) -> BookingRequest {
    BookingRequest {
        listing_id,
        requester_id: format!("bench-{}", Ulid::new()),
        stay: Stay::new(check_in, check_in + Days::new(nights)),
        guests: 2,
        special_requests: None,
    }
}

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 1, 1).unwrap_or_default()
}

async fn setup(n_listings: usize) -> (Arc<Engine>, Vec<Ulid>) {
    let dir = std::env::temp_dir().join(format!("staylock_bench_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let directory = Arc::new(InMemoryDirectory::new());
    let listings: Vec<Ulid> = (0..n_listings).map(|_| Ulid::new()).collect();
    for &id in &listings {
        directory.upsert(listing_policy(id)).unwrap();
    }
    let engine = Engine::new(
        dir.join("bench.wal"),
        directory,
        Arc::new(NotifyHub::new()),
        EngineConfig {
            admission_timeout: Duration::from_secs(30),
            ..EngineConfig::default()
        },
    )
    .unwrap();
    println!("  created {} listings", listings.len());
    (Arc::new(engine), listings)
}

async fn phase1_sequential(engine: &Engine, listing: Ulid) {
    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let req = request(listing, base_date() + Days::new(i as u64 * 2), 2);
        let t = Instant::now();
        engine.submit(req).await.unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} admissions in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("admission latency", &mut latencies);
}

async fn phase2_parallel_listings(engine: Arc<Engine>, listings: &[Ulid]) {
    let n_per_listing = 200;
    let start = Instant::now();
    let mut handles = Vec::new();

    for &listing in listings {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            for j in 0..n_per_listing {
                let req = request(listing, base_date() + Days::new(j * 3), 2);
                engine.submit(req).await.unwrap();
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total = listings.len() as u64 * n_per_listing;
    let ops = total as f64 / elapsed.as_secs_f64();
    println!(
        "  {} listings x {n_per_listing} admissions = {total} total in {:.2}s = {ops:.0} ops/sec",
        listings.len(),
        elapsed.as_secs_f64()
    );
}

async fn phase3_contended(engine: Arc<Engine>, listing: Ulid) {
    let n_tasks = 64;
    let rounds = 50;
    let mut admitted = 0;
    let mut conflicts = 0;
    let mut latencies = Vec::new();
    let start = Instant::now();

    for round in 0..rounds {
        let check_in = base_date() + Days::new(5000 + round * 7);
        let mut handles = Vec::new();
        for _ in 0..n_tasks {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                let t = Instant::now();
                let result = engine.submit(request(listing, check_in, 3)).await;
                (result, t.elapsed())
            }));
        }
        for h in handles {
            let (result, latency) = h.await.unwrap();
            latencies.push(latency);
            match result {
                Ok(_) => admitted += 1,
                Err(BookingError::DateConflict { .. }) => conflicts += 1,
                Err(e) => panic!("unexpected admission error: {e}"),
            }
        }
    }

    println!(
        "  {rounds} rounds x {n_tasks} racing requests: {admitted} admitted, {conflicts} conflicts in {:.2}s",
        start.elapsed().as_secs_f64()
    );
    assert_eq!(admitted, rounds as usize);
    print_latency("contended latency", &mut latencies);
}

async fn phase4_reads_under_load(engine: Arc<Engine>, listing: Ulid) {
    let writer = {
        let engine = engine.clone();
        tokio::spawn(async move {
            for j in 0..500u64 {
                let req = request(listing, base_date() + Days::new(9000 + j * 2), 2);
                let _ = engine.submit(req).await;
            }
        })
    };

    let mut latencies = Vec::with_capacity(2000);
    for i in 0..2000u64 {
        let stay = Stay::new(
            base_date() + Days::new(9000 + i % 1000),
            base_date() + Days::new(9002 + i % 1000),
        );
        let t = Instant::now();
        engine.availability(listing, stay, 2).await.unwrap();
        latencies.push(t.elapsed());
    }
    writer.await.unwrap();
    print_latency("availability latency", &mut latencies);
}

#[tokio::main]
async fn main() {
    println!("=== staylock admission benchmark ===\n");

    println!("[setup]");
    let (engine, listings) = setup(10).await;

    println!("\n[phase 1] sequential admissions on one listing");
    phase1_sequential(&engine, listings[0]).await;

    println!("\n[phase 2] concurrent admissions across listings");
    phase2_parallel_listings(engine.clone(), &listings[1..]).await;

    println!("\n[phase 3] racing admissions for the same stay");
    phase3_contended(engine.clone(), listings[0]).await;

    println!("\n[phase 4] availability reads under write load");
    phase4_reads_under_load(engine.clone(), listings[1]).await;

    println!("\n=== benchmark complete ===");
}
