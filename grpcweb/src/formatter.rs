use colored::*;
use grpcweb_core::sampler::SampleResult;

/// A wrapper struct for a formatted, colored string.
///
/// Implements `Display` so it can be printed directly.
pub struct FormattedString(pub String);

/// Service names of a schema. `degraded` marks names recovered without compiling.
pub struct ServiceList {
    pub services: Vec<String>,
    pub degraded: bool,
}

pub struct MethodList {
    pub service: String,
    pub methods: Vec<String>,
    pub degraded: bool,
}

impl std::fmt::Display for FormattedString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f)?;
        writeln!(f, "{}", self.0)?;
        Ok(())
    }
}

impl From<anyhow::Error> for FormattedString {
    fn from(err: anyhow::Error) -> Self {
        FormattedString(format!("{}\n\n'{:#}'", "Error:".red().bold(), err))
    }
}

impl From<SampleResult> for FormattedString {
    fn from(result: SampleResult) -> Self {
        let status = if result.successful {
            "OK".green().bold()
        } else {
            "FAILED".red().bold()
        };

        let mut out = format!(
            "{} {} code={} message={:?} elapsed={}ms\n",
            status,
            result.label.cyan(),
            result.response_code,
            result.response_message,
            result.elapsed.as_millis()
        );

        out.push('\n');
        out.push_str(&pretty(&result.response_data));
        FormattedString(out)
    }
}

impl From<ServiceList> for FormattedString {
    fn from(list: ServiceList) -> Self {
        if list.services.is_empty() {
            return FormattedString("No services found.".yellow().to_string());
        }

        let mut out = String::new();
        out.push_str("Available Services:\n");
        for svc in list.services {
            out.push_str(&format!("  - {}\n", svc.green()));
        }
        push_degraded_note(&mut out, list.degraded);
        FormattedString(out.trim_end().to_string())
    }
}

impl From<MethodList> for FormattedString {
    fn from(list: MethodList) -> Self {
        if list.methods.is_empty() {
            return FormattedString(
                format!("No methods found for service '{}'.", list.service)
                    .yellow()
                    .to_string(),
            );
        }

        let mut out = format!("{} {} {{\n", "service".cyan(), list.service.green());
        for method in list.methods {
            out.push_str(&format!("  {} {}\n", "rpc".cyan(), method.green()));
        }
        out.push_str("}\n");
        push_degraded_note(&mut out, list.degraded);
        FormattedString(out.trim_end().to_string())
    }
}

fn push_degraded_note(out: &mut String, degraded: bool) {
    if degraded {
        out.push_str(&format!(
            "\n{}\n",
            "(names only: the proto file could not be compiled)".yellow()
        ));
    }
}

/// Pretty prints JSON response data, anything else is shown as is.
fn pretty(data: &str) -> String {
    serde_json::from_str::<serde_json::Value>(data)
        .ok()
        .and_then(|value| serde_json::to_string_pretty(&value).ok())
        .unwrap_or_else(|| data.to_string())
}
