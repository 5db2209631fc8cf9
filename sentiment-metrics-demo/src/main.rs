use getopts::Options;
use quanta::Clock;
use rand::{seq::IndexedRandom, Rng};
use sentiment_metrics::{
    InMemoryRegistry, MeterValue, MetricsError, SentimentMetrics, ANALYSIS_TOTAL,
    COMPANIES_DETECTED,
};
use std::{
    env,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const SENTIMENTS: &[&str] = &["positive", "negative", "neutral"];
const COMPANIES: &[&str] = &["Acme", "Globex", "Initech", "Umbrella", "Hooli"];
const MODELS: &[&str] = &["finbert", "vader"];

/// Pretends to analyze articles and reports each one through the facade.
struct Producer {
    metrics: Arc<SentimentMetrics>,
    done: Arc<AtomicBool>,
}

impl Producer {
    fn run(&self) -> Result<(), MetricsError> {
        let clock = Clock::new();
        let mut rng = rand::rng();

        while !self.done.load(Ordering::Relaxed) {
            let company = COMPANIES.choose(&mut rng).copied().unwrap_or("Acme");
            let sentiment = SENTIMENTS.choose(&mut rng).copied().unwrap_or("neutral");
            let model = MODELS.choose(&mut rng).copied().unwrap_or("finbert");

            let start = clock.now();
            thread::sleep(Duration::from_millis(rng.random_range(1..20)));
            let elapsed = clock.now() - start;

            self.metrics.record_duration(elapsed.as_millis() as u64, company, model)?;
            self.metrics.record_analysis(sentiment, company)?;
            self.metrics.record_confidence(rng.random_range(0.0..=1.0), sentiment, company)?;
            self.metrics.record_companies_detected(rng.random_range(0..=COMPANIES.len() as i32));
        }

        Ok(())
    }
}

fn print_usage(program: &str, opts: &Options) {
    let brief = format!("Usage: {} [options]", program);
    print!("{}", opts.usage(&brief));
}

pub fn opts() -> Options {
    let mut opts = Options::new();

    opts.optopt("d", "duration", "number of seconds to run the demo", "INTEGER");
    opts.optopt("p", "producers", "number of producer threads", "INTEGER");
    opts.optopt(
        "c",
        "cardinality-limit",
        "distinct tag sets per meter before a warning is logged",
        "INTEGER",
    );
    opts.optflag("h", "help", "print this help menu");

    opts
}

fn parse_or<T>(matches: &getopts::Matches, name: &str, default: T) -> Option<T>
where
    T: std::str::FromStr,
{
    match matches.opt_str(name) {
        None => Some(default),
        Some(raw) => match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                error!("invalid value for --{}: {}", name, raw);
                None
            }
        },
    }
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args: Vec<String> = env::args().collect();
    let program = &args[0];
    let opts = opts();

    let matches = match opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(f) => {
            error!("Failed to parse command line args: {}", f);
            return;
        }
    };

    if matches.opt_present("help") {
        print_usage(program, &opts);
        return;
    }

    let (Some(seconds), Some(producers), Some(limit)) = (
        parse_or::<u64>(&matches, "duration", 5),
        parse_or::<usize>(&matches, "producers", 4),
        parse_or::<usize>(&matches, "cardinality-limit", 1000),
    ) else {
        return;
    };

    info!("sentiment metrics demo");
    info!("duration: {}s", seconds);
    info!("producers: {}", producers);

    let registry = Arc::new(InMemoryRegistry::new());
    let metrics = match SentimentMetrics::builder()
        .registry(Arc::clone(&registry))
        .cardinality_limit(limit)
        .build()
    {
        Ok(metrics) => Arc::new(metrics),
        Err(e) => {
            error!("failed to build metrics facade: {}", e);
            return;
        }
    };

    let done = Arc::new(AtomicBool::new(false));
    let mut handles = Vec::new();
    for _ in 0..producers {
        let producer = Producer { metrics: Arc::clone(&metrics), done: Arc::clone(&done) };
        handles.push(thread::spawn(move || producer.run()));
    }

    for _ in 0..seconds {
        thread::sleep(Duration::from_secs(1));

        let snapshot = registry.snapshot();
        let analyses: u64 = snapshot
            .entries()
            .iter()
            .filter(|e| e.key.name() == ANALYSIS_TOTAL)
            .filter_map(|e| match e.value {
                MeterValue::Counter(v) => Some(v),
                _ => None,
            })
            .sum();
        let companies = snapshot.gauge(COMPANIES_DETECTED, &[]).unwrap_or_default();
        info!("analyses so far: {}, companies in last analysis: {}", analyses, companies);
    }

    done.store(true, Ordering::SeqCst);
    for handle in handles {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("producer stopped early: {}", e),
            Err(_) => error!("producer panicked"),
        }
    }

    info!("--------------------------------------------------------------------------------");
    for entry in registry.snapshot().entries() {
        let labels =
            entry.key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect::<Vec<_>>();
        match &entry.value {
            MeterValue::Counter(v) => info!("{}{{{}}} {}", entry.key.name(), labels.join(","), v),
            MeterValue::Gauge(v) => info!("{}{{{}}} {}", entry.key.name(), labels.join(","), v),
            MeterValue::Timer(dist) | MeterValue::Summary(dist) => {
                let percentiles = dist
                    .percentiles()
                    .iter()
                    .map(|(q, v)| format!("{}: {:.2}", q.label(), v))
                    .collect::<Vec<_>>();
                info!(
                    "{}{{{}}} count: {} mean: {:.2} max: {:.2} {}",
                    entry.key.name(),
                    labels.join(","),
                    dist.count(),
                    dist.mean(),
                    dist.max(),
                    percentiles.join(" ")
                );
            }
        }
    }
}
