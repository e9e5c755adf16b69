// Job pool demo
//
// Ten workers, fifty jobs, each job one of four functions picked at random.
// The main thread fills the queue before starting the workers, sleeps for
// two seconds and then shuts the pool down.

use std::thread;
use std::time::Duration;

use jobpool::{logging, Job, OutputGuard, Pool};
use rand::Rng;

fn report(guard: &OutputGuard, function: u32, message: Option<&String>) {
    let header = format!("Function {} doing work", function);
    let result = match message {
        Some(message) => guard.println_all([header.as_str(), message.as_str()]),
        None => guard.println_all([header.as_str()]),
    };
    if let Err(e) = result {
        logging::warn!(error = %e, "failed to write job output");
    }
}

fn make_job(function: u32, guard: OutputGuard, message: String) -> Job {
    Job::new(
        move |message: Option<&String>| report(&guard, function, message),
        Some(message),
    )
    .with_label(format!("func_{}", function))
}

fn main() -> anyhow::Result<()> {
    logging::init_default();

    let pool = Pool::new(10)?;
    let guard = pool.output_guard();
    let mut rng = rand::thread_rng();

    for i in 0..50 {
        let function = rng.gen_range(1..=4);
        pool.submit(make_job(function, guard.clone(), format!("Hello {}", i)))?;
    }
    pool.start()?;

    guard.println_all(["Putting main thread to sleep for 2 seconds"])?;
    thread::sleep(Duration::from_secs(2));

    let report = pool.shutdown()?;
    logging::info!(
        executed = report.executed,
        dropped = report.dropped,
        "demo finished"
    );
    Ok(())
}
