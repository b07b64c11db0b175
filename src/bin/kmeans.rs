use clap::Parser;
use liquid_kmeans::config::LiquidConfig;
use liquid_kmeans::error::LiquidError;
use liquid_kmeans::kmeans::{KMeans, KMeansConfig};
use liquid_kmeans::runtime::Runtime;
use log::Level;

/// Clusters the rows of a CSV file with k-means, printing the total error of
/// every iteration and the final centroids
#[derive(Parser)]
#[command(version = "1.0")]
struct Opts {
    /// The CSV file to cluster
    file: String,
    /// The number of clusters
    #[arg(short = 'k', long = "clusters", default_value_t = 3)]
    k: usize,
    /// The maximum number of iterations
    #[arg(short = 'i', long = "iterations", default_value_t = 100)]
    iterations: usize,
    /// Indices of columns to leave out of the points, may be repeated
    #[arg(long = "skip")]
    skip: Vec<usize>,
    /// Stop once the error changes by less than this between iterations
    #[arg(long)]
    threshold: Option<f64>,
    /// Seed for picking the initial centroid
    #[arg(long)]
    seed: Option<u64>,
    /// The number of execution units, defaults to the number of cores
    #[arg(long)]
    units: Option<usize>,
    /// The number of rows per chunk, derived from the row width by default
    #[arg(long = "rows-per-chunk")]
    rows_per_chunk: Option<usize>,
    /// The first line of the file is data, not column names
    #[arg(long = "no-headers")]
    no_headers: bool,
    /// The log level
    #[arg(long = "log", default_value = "warn")]
    log: String,
}

#[tokio::main]
async fn main() -> Result<(), LiquidError> {
    let opts = Opts::parse();
    let level: Level =
        opts.log
            .parse()
            .map_err(|_| LiquidError::InvalidParameter {
                name: "log",
                message: format!("unknown log level {:?}", opts.log),
            })?;
    simple_logger::init_with_level(level)?;

    let mut config = LiquidConfig::default();
    if let Some(units) = opts.units {
        config.executor.n_units = units;
    }
    config.store.rows_per_chunk = opts.rows_per_chunk;
    let runtime = Runtime::new(config);
    let dataset = runtime
        .df_from_csv("points", &opts.file, !opts.no_headers)
        .await?;

    let cols: Vec<usize> = (0..dataset.n_cols())
        .filter(|c| !opts.skip.contains(c))
        .collect();
    let mut km_config =
        KMeansConfig::new(opts.k).with_max_iterations(opts.iterations);
    if let Some(threshold) = opts.threshold {
        km_config = km_config.with_threshold(threshold);
    }
    if let Some(seed) = opts.seed {
        km_config = km_config.with_seed(seed);
    }
    let mut kmeans = KMeans::new("points", cols, km_config)?;

    while !kmeans.step(&runtime).await?.is_terminal() {
        print_error(&kmeans);
    }
    print_error(&kmeans);

    println!("Clusters:");
    for centroid in kmeans.centroids() {
        let values: Vec<String> =
            centroid.iter().map(|v| format!("{:.2}", v)).collect();
        println!("{}", values.join(", "));
    }
    Ok(())
}

fn print_error(kmeans: &KMeans) {
    if let Some(error) = kmeans.errors().last() {
        println!("Error is {}", error);
    }
}
