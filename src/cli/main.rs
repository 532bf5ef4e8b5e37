use std::{sync::Arc, time::Duration};

use argument::Cli;
use clap::Parser;
#[cfg(feature = "log")]
use linkscout::initialize_logging;
use linkscout::{
    emitter::DirectorySink,
    fetcher::{FileSource, Source, UrlSource},
    geolookup::GeoLookup,
    pipeline::{self, Pipeline, PipelineError},
    prober::ProbeMode,
};
#[cfg(feature = "progress_bar")]
use status_line::StatusLine;
use tokio::runtime;

mod argument;

fn main() {
    if let Err(e) = run_application() {
        eprintln!("Error: {:?}", e);
        std::process::exit(1);
    }
}

fn build_config(options: &Cli) -> pipeline::Config {
    let mut config = pipeline::Config::default();
    config.filter.enabled = !options.no_smart_filter;

    config.prober.concurrency_limit = options.max_connections as usize;
    config.prober.batch_size = options.batch_size as usize;
    config.prober.tls_probe = !options.no_tls;
    config.prober.timeout = options.timeout.map(Duration::from_secs);
    if options.fast {
        config.prober.mode = ProbeMode::Fast;
    }

    config.classifier.max_per_protocol = options.max_per_protocol;
    config.classifier.max_per_country = options.max_per_country;
    config
}

fn run_application() -> anyhow::Result<()> {
    let options = Cli::parse();

    #[cfg(feature = "log")]
    {
        let log_level = match options.log_level.as_str() {
            "debug" => log::LevelFilter::Debug,
            "info" => log::LevelFilter::Info,
            "warn" => log::LevelFilter::Warn,
            "error" => log::LevelFilter::Error,
            "trace" => log::LevelFilter::Trace,
            _ => log::LevelFilter::Off,
        };
        initialize_logging(log_level)?;
    }

    let runtime = runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(async {
        let mut pipeline = Pipeline::with_tcp_prober(build_config(&options))?;
        if options.geo_lookup {
            pipeline = pipeline.with_geolookup(Arc::new(GeoLookup::new().await?));
        }

        let mut sources: Vec<Arc<dyn Source>> = vec![];
        for url in &options.url {
            sources.push(Arc::new(UrlSource::new(url.as_str())));
        }
        for file in &options.file {
            sources.push(Arc::new(FileSource::new(file)));
        }
        let sink = DirectorySink::new(&options.output_dir).with_base64_copies(options.base64);

        let outcome = {
            #[cfg(feature = "progress_bar")]
            let _status = StatusLine::new(pipeline.progress());
            pipeline.run(sources, &sink).await
        };

        let summary = match outcome {
            Ok(report) => report.summary,
            Err(PipelineError::NoValidConfigs(summary)) => {
                println!("{}", summary);
                anyhow::bail!(PipelineError::NoValidConfigs(summary));
            }
        };

        println!("{}", summary);
        if let Some(path) = &options.report {
            tokio::fs::write(path, summary.as_json()).await?;
        }
        Ok(())
    })
}
