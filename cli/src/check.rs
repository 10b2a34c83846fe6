use kube::Client;
use mesh_ingress_controller::ApiVersion;
use serde::Serialize;

const CHECK: &str = "√";
const WARN: &str = "‼";
const EX: &str = "×";

#[derive(Serialize)]
struct CheckOutput<'a> {
    success: bool,
    checks: &'a [CheckResult],
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Success,
    Warning,
    Error,
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    description: String,
    result: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl CheckResult {
    pub fn success(&self) -> bool {
        self.result != CheckStatus::Error
    }
}

/// Checks that the cluster serves ingresses at `version`. A missing version is
/// only an error when it is `required`.
pub async fn api_version_check(
    client: &Client,
    version: ApiVersion,
    required: bool,
) -> CheckResult {
    let description = format!("{} Ingress API is served", version);
    let failed = if required {
        CheckStatus::Error
    } else {
        CheckStatus::Warning
    };
    match client.list_api_group_resources(version.as_str()).await {
        Ok(list) if list.resources.iter().any(|r| r.name == "ingresses") => CheckResult {
            description,
            result: CheckStatus::Success,
            error: None,
        },
        Ok(_) => CheckResult {
            description,
            result: failed,
            error: Some(format!("{} does not serve ingresses", version)),
        },
        Err(error) => CheckResult {
            description,
            result: failed,
            error: Some(error.to_string()),
        },
    }
}

pub async fn run_checks(client: Client, requested: ApiVersion) -> Vec<CheckResult> {
    let mut results = Vec::with_capacity(ApiVersion::ALL.len());
    for version in ApiVersion::ALL {
        results.push(api_version_check(&client, version, version == requested).await);
    }
    results
}

pub fn print_checks(results: &[CheckResult]) -> bool {
    let category = "mesh-ingress";
    println!("{}", category);
    println!("{}", category.chars().map(|_| '-').collect::<String>());
    for result in results {
        let symbol = match result.result {
            CheckStatus::Success => CHECK,
            CheckStatus::Warning => WARN,
            CheckStatus::Error => EX,
        };
        println!("{} {}", symbol, result.description);
        if let Some(error) = &result.error {
            println!("    {}", error);
        }
    }

    let success = results.iter().all(CheckResult::success);
    println!();
    println!(
        "Status check results are {}",
        if success { CHECK } else { EX }
    );
    success
}

pub fn json_print_checks(results: &[CheckResult]) -> bool {
    let success = results.iter().all(CheckResult::success);
    let output = CheckOutput {
        success,
        checks: results,
    };
    serde_json::to_writer_pretty(std::io::stdout(), &output).expect("serialization failed");
    println!();
    success
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warnings_do_not_fail_checks() {
        let results = [
            CheckResult {
                description: "networking.k8s.io/v1 Ingress API is served".to_string(),
                result: CheckStatus::Success,
                error: None,
            },
            CheckResult {
                description: "networking.k8s.io/v1beta1 Ingress API is served".to_string(),
                result: CheckStatus::Warning,
                error: Some("not found".to_string()),
            },
        ];
        assert!(results.iter().all(CheckResult::success));

        let output = serde_json::to_value(CheckOutput {
            success: true,
            checks: &results[1..],
        })
        .unwrap();
        assert_eq!(
            output,
            serde_json::json!({
                "success": true,
                "checks": [{
                    "description": "networking.k8s.io/v1beta1 Ingress API is served",
                    "result": "warning",
                    "error": "not found",
                }],
            })
        );
    }
}
