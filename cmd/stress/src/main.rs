//! Stress test - many virtual serial pairs at once
//!
//! Each pair gets a writer and a reader thread. The writer pushes
//! variable-size chunks and drains after each; the reader pulls them
//! back with threshold reads and checks the byte sequence.
//!
//! Usage: stress [pairs] [chunks-per-pair]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use vserial::{
    close, drain, open_pair, read_cond, write, DescriptorId, PipeConfig, Registry,
    TimeoutPolicy, VsResult,
};

fn writer(des: DescriptorId, chunks: usize, max_chunk: usize) -> VsResult<u64> {
    let mut seq: u8 = 0;
    let mut buf = vec![0u8; max_chunk];
    let mut total = 0u64;

    for i in 0..chunks {
        let len = 1 + i % max_chunk;
        for b in &mut buf[..len] {
            *b = seq;
            seq = seq.wrapping_add(1);
        }
        let mut sent = 0;
        while sent < len {
            sent += write(des, &buf[sent..len])?;
            // Ring full or not, waiting for the reader frees room
            drain(des)?;
        }
        total += len as u64;
    }
    close(des)?;
    Ok(total)
}

fn reader(des: DescriptorId, bytes: &AtomicU64) -> VsResult<bool> {
    let mut expect: u8 = 0;
    let mut buf = [0u8; 64];
    loop {
        let n = read_cond(des, &mut buf, 1, TimeoutPolicy::BlockIndefinitely)?;
        if n == 0 {
            break;
        }
        for &b in &buf[..n] {
            if b != expect {
                return Ok(false);
            }
            expect = expect.wrapping_add(1);
        }
        bytes.fetch_add(n as u64, Ordering::Relaxed);
    }
    close(des)?;
    Ok(true)
}

fn main() -> VsResult<()> {
    println!("=== vserial Stress Test ===\n");

    let mut args = std::env::args().skip(1);
    let num_pairs: usize = args.next().and_then(|s| s.parse().ok()).unwrap_or(64);
    let chunks: usize = args.next().and_then(|s| s.parse().ok()).unwrap_or(2_000);

    let max_chunk = Registry::global().config().buffer_size.min(200);
    println!("Pairs:        {}", num_pairs);
    println!("Chunks/pair:  {}", chunks);
    println!("Config:       {:?}", PipeConfig::from_env());

    let bytes = Arc::new(AtomicU64::new(0));
    let start = Instant::now();

    let mut handles = Vec::with_capacity(num_pairs);
    for _ in 0..num_pairs {
        let (tx, rx) = open_pair()?;
        let w = thread::spawn(move || writer(tx, chunks, max_chunk));
        let bytes = bytes.clone();
        let r = thread::spawn(move || reader(rx, &bytes));
        handles.push((w, r));
    }
    println!("Known range:  {}\n", Registry::global().known_range());

    let progress = {
        let bytes = bytes.clone();
        thread::spawn(move || {
            let mut last = 0;
            loop {
                thread::sleep(Duration::from_millis(200));
                let now = bytes.load(Ordering::Relaxed);
                if now == last {
                    break;
                }
                print!("\rTransferred: {} bytes", now);
                last = now;
            }
        })
    };

    let mut sent = 0u64;
    let mut corrupt = 0usize;
    let mut failed = 0usize;
    for (w, r) in handles {
        match w.join() {
            Ok(Ok(n)) => sent += n,
            _ => failed += 1,
        }
        match r.join() {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => corrupt += 1,
            _ => failed += 1,
        }
    }
    let elapsed = start.elapsed();
    let _ = progress.join();

    let received = bytes.load(Ordering::Relaxed);
    println!("\n\n=== Results ===");
    println!("Bytes sent:      {}", sent);
    println!("Bytes received:  {}", received);
    println!("Corrupt streams: {}", corrupt);
    println!("Failed threads:  {}", failed);
    println!("Elapsed:         {:?}", elapsed);
    println!("Throughput:      {:.2} MB/sec",
        received as f64 / elapsed.as_secs_f64() / (1024.0 * 1024.0));

    println!("\n=== Stress Test Complete ===");
    Ok(())
}
