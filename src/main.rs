use matchmaker::Problem;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let path = std::env::args()
        .nth(1)
        .ok_or("Usage: <program> <problem.yaml>")?;

    let problem = Problem::from_path(path)?;
    let report = problem.solve()?;

    println!("{}", serde_yaml::to_string(&report)?);
    Ok(())
}
