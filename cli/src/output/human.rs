//! Human-readable terminal renderer.

use owo_colors::OwoColorize as _;
use stratus_common::{CloudApplication, CloudDomain, CloudService, ServiceOffering};

use crate::application::services::deploy::{DeployOutcome, Stage};
use crate::application::services::publish::PublishReport;
use crate::domain::config::StratusConfig;
use crate::domain::{ApplicationModule, RemoteSnapshot};
use crate::output::OutputContext;

/// Renders domain types as human-readable terminal output using `OutputContext`.
pub struct HumanRenderer<'a> {
    ctx: &'a OutputContext,
}

impl<'a> HumanRenderer<'a> {
    /// Create a new `HumanRenderer` wrapping the given output context.
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx }
    }

    /// Render the CLI version information.
    pub fn render_version(&self, version: &str) {
        if self.ctx.quiet {
            return;
        }
        println!("stratus {version}");
    }

    /// Render tracked modules followed by applications nobody tracks.
    pub fn render_apps<'m>(
        &self,
        modules: impl IntoIterator<Item = &'m ApplicationModule>,
        external: &[CloudApplication],
    ) {
        let modules: Vec<_> = modules.into_iter().collect();
        if modules.is_empty() && external.is_empty() {
            self.ctx.info("No applications. Push one: stratus push <path>");
            return;
        }
        println!(
            "  {:<20} {:<10} {:>9} {:>7}  {}",
            "name".style(self.ctx.styles.bold),
            "status".style(self.ctx.styles.bold),
            "instances".style(self.ctx.styles.bold),
            "memory".style(self.ctx.styles.bold),
            "urls".style(self.ctx.styles.bold),
        );
        for module in modules {
            let name = module.deployed_name().unwrap_or(module.module_id());
            let (instances, memory, uris) = match module.snapshot() {
                Some(s) => (
                    format!("{}/{}", s.app.running_instances, s.app.instances),
                    format!("{}M", s.app.memory),
                    s.app.uris.join(", "),
                ),
                None => (
                    "-".to_string(),
                    format!("{}M", module.deployment().memory),
                    module.deployment().uris.join(", "),
                ),
            };
            let status = format!("{:<10}", module.status.to_string());
            println!(
                "  {name:<20} {} {instances:>9} {memory:>7}  {}",
                status.style(self.ctx.styles.status(module.status)),
                uris.style(self.ctx.styles.url),
            );
        }
        for app in external {
            println!(
                "  {:<20} {:<10} {:>9} {:>7}  {}",
                app.name,
                app.state.to_string().style(self.ctx.styles.dim),
                format!("{}/{}", app.running_instances, app.instances),
                format!("{}M", app.memory),
                app.uris.join(", ").style(self.ctx.styles.url),
            );
        }
        if !external.is_empty() {
            println!();
            self.ctx
                .info("Untracked applications are listed by remote state.");
        }
    }

    /// Render the result of a push, start or restart.
    pub fn render_outcome(&self, outcome: &DeployOutcome) {
        match (outcome.stage, &outcome.app) {
            (Stage::Started, Some(app)) => {
                self.ctx
                    .success(&format!("{} is running", outcome.module_id));
                for uri in &app.uris {
                    self.ctx.kv("url:", &uri.style(self.ctx.styles.url).to_string());
                }
            }
            (Stage::Started, None) => {
                self.ctx
                    .success(&format!("{} is running", outcome.module_id));
            }
            _ => self
                .ctx
                .success(&format!("{} pushed (not started)", outcome.module_id)),
        }
    }

    /// Render instance stats for one application.
    pub fn render_stats(&self, snapshot: &RemoteSnapshot) {
        let app = &snapshot.app;
        self.ctx.header(&app.name);
        self.ctx.kv("state:", &app.state.to_string());
        self.ctx.kv(
            "instances:",
            &format!("{}/{}", app.running_instances, app.instances),
        );
        self.ctx.kv("memory:", &format!("{}M", app.memory));
        if let Some(stats) = &snapshot.stats {
            println!();
            println!(
                "  {:<6} {:<10} {:>7} {:>10} {:>10}",
                "#", "state", "cpu", "memory", "uptime"
            );
            for record in &stats.records {
                println!(
                    "  {:<6} {:<10} {:>6.1}% {:>9}M {:>9}s",
                    record.id,
                    format!("{:?}", record.state).to_lowercase(),
                    record.cpu,
                    record.mem_bytes / (1024 * 1024),
                    record.uptime_secs.round(),
                );
            }
        }
        if let Some(instances) = &snapshot.instances {
            for inst in instances.instances.iter().filter(|i| i.debug_port.is_some()) {
                let ip = inst.debug_ip.as_deref().unwrap_or("?");
                let port = inst.debug_port.unwrap_or_default();
                self.ctx
                    .kv(&format!("debug #{}:", inst.index), &format!("{ip}:{port}"));
            }
        }
    }

    pub fn render_services(&self, services: &[CloudService]) {
        if services.is_empty() {
            self.ctx.info("No services provisioned.");
            return;
        }
        for s in services {
            let label = s.label.as_deref().unwrap_or("-");
            let plan = s.plan.as_deref().unwrap_or("-");
            println!("  {:<24} {label:<16} {plan}", s.name);
        }
    }

    pub fn render_offerings(&self, offerings: &[ServiceOffering]) {
        for o in offerings {
            let version = o.version.as_deref().unwrap_or("");
            let desc = o.description.as_deref().unwrap_or("");
            println!(
                "  {:<16} {version:<8} {}",
                o.label,
                desc.style(self.ctx.styles.dim)
            );
        }
    }

    pub fn render_domains(&self, domains: &[CloudDomain]) {
        for d in domains {
            println!("  {}", d.name);
        }
    }

    /// Render the staging log chunk as-is.
    pub fn render_log(&self, chunk: Option<&str>) {
        match chunk {
            Some(text) => print!("{text}"),
            None => self.ctx.info("No staging log available."),
        }
    }

    pub fn render_publish(&self, report: &PublishReport) {
        for id in &report.published {
            self.ctx.success(&format!("{id} published"));
        }
        for (id, err) in &report.failed {
            self.ctx.error(&format!("{id}: {err}"));
        }
        if report.published.is_empty() && report.failed.is_empty() {
            self.ctx.info("Nothing to publish.");
        }
    }

    /// Render the current configuration.
    pub fn render_config(&self, config: &StratusConfig, path: &std::path::Path) {
        let unset = || "(not set)".to_string();
        println!();
        println!(
            "  {}",
            format!("Configuration ({})", path.display()).style(self.ctx.styles.header)
        );
        println!();
        println!(
            "  {:<28} {}",
            "server.url:",
            config.server.url.clone().unwrap_or_else(unset)
        );
        println!(
            "  {:<28} {}",
            "server.username:",
            config.server.username.clone().unwrap_or_else(unset)
        );
        println!("  {:<28} {}", "refresh.interval_secs:", config.refresh.interval_secs);
        println!("  {:<28} {}", "timeouts.request_secs:", config.timeouts.request_secs);
        println!(
            "  {:<28} {}",
            "timeouts.deployment_secs:", config.timeouts.deployment_secs
        );
        println!("  {:<28} {}", "timeouts.upload_secs:", config.timeouts.upload_secs);
        println!(
            "  {:<28} {}",
            "proxy.url:",
            config.proxy.url.clone().unwrap_or_else(unset)
        );
        println!("  {:<28} {}", "tunnel_app:", config.tunnel_app);
        println!();
        println!("  {}", "Environment:".style(self.ctx.styles.bold));
        for var in ["STRATUS_CONFIG", "STRATUS_LOG", "NO_COLOR"] {
            println!(
                "    {:<18} {}",
                format!("{var}:"),
                std::env::var(var).unwrap_or_else(|_| unset())
            );
        }
        println!();
    }
}
