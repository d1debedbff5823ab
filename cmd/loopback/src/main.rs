//! Loopback demo - host and device threads on one virtual serial line
//!
//! The host sends fixed-size frames and drains after each one; the device
//! reads whole frames with a threshold read and echoes them back.

use std::thread;
use std::time::Instant;

use vserial::{close, drain, open_pair, read_cond, write, DescriptorId, TimeoutPolicy, VsResult};

const FRAME: usize = 16;

fn device_loop(des: DescriptorId) -> VsResult<usize> {
    let mut frame = [0u8; FRAME];
    let mut frames = 0;
    loop {
        let n = read_cond(des, &mut frame, FRAME, TimeoutPolicy::BlockIndefinitely)?;
        if n < FRAME {
            // Host hung up
            break;
        }
        write(des, &frame)?;
        drain(des)?;
        frames += 1;
    }
    close(des)?;
    Ok(frames)
}

fn main() -> VsResult<()> {
    println!("=== vserial Loopback ===\n");

    let count: usize = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(1000);

    let (host, dev) = open_pair()?;
    println!("Pair: host={} device={}", host, dev);

    let device = thread::Builder::new()
        .name("device".into())
        .spawn(move || device_loop(dev))
        .expect("failed to spawn device thread");

    let start = Instant::now();
    let mut frame = [0u8; FRAME];
    let mut echo = [0u8; FRAME];

    for i in 0..count {
        frame[..8].copy_from_slice(&(i as u64).to_le_bytes());
        frame[8..].fill((i % 251) as u8);

        let sent = write(host, &frame)?;
        assert_eq!(sent, FRAME, "ring too small for one frame");
        drain(host)?;

        read_cond(host, &mut echo, FRAME, TimeoutPolicy::BlockIndefinitely)?;
        if echo != frame {
            println!("Mismatch at frame {}", i);
            break;
        }
    }

    close(host)?;
    let echoed = match device.join() {
        Ok(result) => result?,
        Err(_) => {
            println!("Device thread panicked");
            0
        }
    };
    let elapsed = start.elapsed();

    println!("\n=== Results ===");
    println!("Frames sent:     {}", count);
    println!("Frames echoed:   {}", echoed);
    println!("Elapsed:         {:?}", elapsed);
    println!("Round trips/sec: {:.0}", echoed as f64 / elapsed.as_secs_f64());

    println!("\n=== Loopback Complete ===");
    Ok(())
}
