use config::ConfigError;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{DatabaseConfig, SchedulerConfig};
use crate::store::Store;
use crate::tracker::{CycleReport, Tracker};
use crate::utils::error::AppError;

/// Cron expressions (with seconds) for fixed daily run times, in UTC.
pub fn cron_expressions(config: &SchedulerConfig) -> Result<Vec<String>, ConfigError> {
    Ok(config
        .parsed_times()?
        .into_iter()
        .map(|(hour, minute)| format!("0 {} {} * * *", minute, hour))
        .collect())
}

type JobFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

fn job_fn(
    tracker: Arc<Tracker>,
    database: DatabaseConfig,
    running: Arc<Mutex<()>>,
) -> impl FnMut(Uuid, JobScheduler) -> JobFuture + Send + Sync + 'static {
    move |_uuid: Uuid, _scheduler: JobScheduler| -> JobFuture {
        let tracker = Arc::clone(&tracker);
        let database = database.clone();
        let running = Arc::clone(&running);
        Box::pin(async move {
            RunScheduler::tick(tracker, database, running).await;
        })
    }
}

/// Triggers run cycles on a schedule. Each tick opens the store, runs one
/// cycle and closes it again; a tick that arrives while a cycle is still
/// running is skipped.
pub struct RunScheduler {
    scheduler: JobScheduler,
    tracker: Arc<Tracker>,
    database: DatabaseConfig,
    config: SchedulerConfig,
    running: Arc<Mutex<()>>,
}

impl RunScheduler {
    pub async fn new(tracker: Arc<Tracker>, database: DatabaseConfig, config: SchedulerConfig) -> Result<Self, AppError> {
        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            scheduler,
            tracker,
            database,
            config,
            running: Arc::new(Mutex::new(())),
        })
    }

    /// Register the jobs and start the scheduler, after an optional
    /// immediate cycle.
    pub async fn start(&mut self) -> Result<(), AppError> {
        if self.config.immediate_run {
            Self::tick(Arc::clone(&self.tracker), self.database.clone(), Arc::clone(&self.running)).await;
        }

        let expressions = cron_expressions(&self.config)?;
        if expressions.is_empty() {
            let interval = self.config.interval();
            let job = Job::new_repeated_async(interval, self.job())?;
            self.scheduler.add(job).await?;
            info!("Scheduled run cycle every {:?}", interval);
        } else {
            for expression in &expressions {
                let job = Job::new_async(expression.as_str(), self.job())?;
                self.scheduler.add(job).await?;
                info!("Scheduled run cycle with cron '{}' (UTC)", expression);
            }
        }

        self.scheduler.start().await?;
        info!("Run scheduler started");
        Ok(())
    }

    fn job(&self) -> impl FnMut(Uuid, JobScheduler) -> JobFuture + Send + Sync + 'static + use<> {
        job_fn(Arc::clone(&self.tracker), self.database.clone(), Arc::clone(&self.running))
    }

    pub async fn shutdown(&mut self) -> Result<(), AppError> {
        self.scheduler.shutdown().await?;
        info!("Run scheduler shutdown");
        Ok(())
    }

    /// Run one cycle unless another is in progress.
    pub async fn tick(tracker: Arc<Tracker>, database: DatabaseConfig, running: Arc<Mutex<()>>) -> Option<CycleReport> {
        let Ok(_guard) = running.try_lock() else {
            warn!("Previous run cycle still in progress, skipping this tick");
            return None;
        };

        debug!("Opening store for scheduled cycle");
        let store = match Store::open(&database).await {
            Ok(store) => store,
            Err(e) => {
                error!("Failed to open store: {}", e);
                return None;
            }
        };

        let report = match tracker.run_cycle(&store).await {
            Ok(report) => Some(report),
            Err(e) => {
                error!("Run cycle failed: {}", e);
                None
            }
        };
        store.close().await;
        report
    }

    pub fn running_lock(&self) -> Arc<Mutex<()>> {
        Arc::clone(&self.running)
    }
}
