//! End-to-end scenarios run against every flavor through the `Push`/`Pop`
//! traits.

use std::collections::HashSet;
use std::thread;
use std::time::{Duration, Instant};

use relay_channel::{
    ChannelConfig, Flavor, MpmcFixed, MpmcFlexible, Pop, PopError, Push, PushError, SpscFixed,
    SpscFlexible, create_fixed_queue, create_queue,
};

fn fixed_capacity_two<F>()
where
    F: Flavor<&'static str>,
    F::Config: Default,
{
    let (mut tx, mut rx) = create_fixed_queue::<&'static str, F>().unwrap();
    tx.try_push("a").unwrap();
    tx.try_push("b").unwrap();
    assert_eq!(tx.try_push("c"), Err(PushError::Full("c")));

    assert_eq!(rx.pop(), Ok("a"));
    tx.try_push("c").unwrap();
    assert_eq!(rx.pop(), Ok("b"));
    assert_eq!(rx.pop(), Ok("c"));
    assert_eq!(rx.try_pop(), Err(PopError::Empty));
}

#[test]
fn full_then_drain_at_capacity_two() {
    fixed_capacity_two::<SpscFixed<2>>();
    fixed_capacity_two::<MpmcFixed<2>>();
}

fn four_tagged_producers<F>(config: F::Config)
where
    F: Flavor<(u64, u64)>,
    F::Sender: Clone + Send + 'static,
{
    let (tx, mut rx) = F::create(config).unwrap();
    let producers: Vec<_> = (0..4)
        .map(|p| {
            let mut tx = tx.clone();
            thread::spawn(move || {
                for i in 0..1000 {
                    tx.push((p, i)).unwrap();
                }
            })
        })
        .collect();
    drop(tx);

    let mut seen = HashSet::new();
    let mut next = [0u64; 4];
    loop {
        match rx.pop() {
            Ok((p, i)) => {
                assert_eq!(next[p as usize], i, "producer {p} out of order");
                next[p as usize] += 1;
                assert!(seen.insert((p, i)), "duplicate {p}/{i}");
            }
            Err(PopError::Closed) => break,
            Err(other) => panic!("unexpected {other:?}"),
        }
    }
    for h in producers {
        h.join().unwrap();
    }
    assert_eq!(seen.len(), 4000);
}

#[test]
fn four_producers_one_consumer_mpmc() {
    four_tagged_producers::<MpmcFixed<16>>(());
    four_tagged_producers::<MpmcFlexible>(16.into());
}

fn million_through_capacity_hundred<F>(config: F::Config)
where
    F: Flavor<u64>,
    F::Sender: Send + 'static,
{
    const COUNT: u64 = 1_000_000;
    let (mut tx, mut rx) = F::create(config).unwrap();

    let producer = thread::spawn(move || {
        for i in 0..COUNT {
            tx.push(i).unwrap();
        }
    });

    for expected in 0..COUNT {
        assert_eq!(rx.pop(), Ok(expected));
    }
    producer.join().unwrap();
    assert_eq!(rx.pop(), Err(PopError::Closed));
    assert!(rx.is_empty());
}

#[test]
fn million_values_spsc() {
    million_through_capacity_hundred::<SpscFixed<100>>(ChannelConfig::default());
    million_through_capacity_hundred::<SpscFlexible>(100.into());
}

#[test]
fn million_values_mpmc() {
    million_through_capacity_hundred::<MpmcFixed<100>>(());
}

fn idle_pop_times_out<F>(config: F::Config)
where
    F: Flavor<u64>,
{
    let (_tx, mut rx) = F::create(config).unwrap();
    let start = Instant::now();
    assert_eq!(rx.pop_timeout(Duration::from_millis(50)), Err(PopError::Timeout));
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(50), "woke early: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(500), "woke late: {elapsed:?}");
}

#[test]
fn pop_timeout_on_idle_queue() {
    idle_pop_times_out::<SpscFixed<8>>(ChannelConfig::default());
    idle_pop_times_out::<SpscFlexible>(8.into());
    idle_pop_times_out::<MpmcFixed<8>>(());
    idle_pop_times_out::<MpmcFlexible>(8.into());
}

fn full_push_times_out<F>(config: F::Config)
where
    F: Flavor<u64>,
{
    let (mut tx, _rx) = F::create(config).unwrap();
    while tx.try_push(0).is_ok() {}
    let start = Instant::now();
    assert_eq!(
        tx.push_timeout(7, Duration::from_millis(20)),
        Err(PushError::Timeout(7))
    );
    assert!(start.elapsed() >= Duration::from_millis(20));
}

#[test]
fn push_timeout_on_full_queue() {
    full_push_times_out::<SpscFixed<4>>(ChannelConfig::default());
    full_push_times_out::<MpmcFixed<4>>(());
    let capped = relay_channel::FlexibleConfig::new(4).with_max_capacity(16);
    full_push_times_out::<SpscFlexible>(capped);
    full_push_times_out::<MpmcFlexible>(capped);
}

#[test]
fn flexible_growth_without_consumer() {
    let (mut tx, rx) = create_queue::<u64, SpscFlexible>(100).unwrap();
    for i in 0..200 {
        tx.try_push(i).unwrap();
    }
    assert!(tx.capacity() >= tx.len());
    assert_eq!(rx.len(), 200);

    let (mut tx, rx) = create_queue::<u64, MpmcFlexible>(100).unwrap();
    for i in 0..200 {
        Push::try_push(&mut tx, i).unwrap();
    }
    assert!(Push::capacity(&tx) >= Push::len(&tx));
    assert_eq!(Pop::len(&rx), 200);
}
