use crate::domain::model::{WorkContext, WorkType};
use crate::utils::error::{ReconError, Result};
use crate::utils::validation::{validate_non_empty_string, validate_path, validate_url, Validate};
use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "equip-recon")]
#[command(about = "Reconcile contract equipment slots with field units for a work order")]
pub struct CliConfig {
    #[arg(long, default_value = "http://localhost:8080/api")]
    pub endpoint: String,

    #[arg(long)]
    pub work_order_id: String,

    /// 作業類型代碼 01-09
    #[arg(long, default_value = "01")]
    pub work_type: String,

    #[arg(long, default_value = "20")]
    pub contract_status: String,

    #[arg(long, default_value = "")]
    pub base_product: String,

    #[arg(long, help = "Bundle product attached to the contract")]
    pub bundle_product: bool,

    #[arg(long, help = "TOML file overriding the built-in rules")]
    pub rules_file: Option<String>,

    #[arg(long, default_value = "./drafts")]
    pub draft_dir: String,

    #[arg(long, help = "Submit the composition when it validates")]
    pub commit: bool,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub json_logs: bool,
}

impl CliConfig {
    pub fn work_type(&self) -> Result<WorkType> {
        WorkType::from_code(&self.work_type).ok_or_else(|| ReconError::InvalidConfigValueError {
            field: "work_type".to_string(),
            value: self.work_type.clone(),
            reason: "expected a code between 01 and 09".to_string(),
        })
    }

    pub fn work_context(&self) -> Result<WorkContext> {
        let mut context = WorkContext::new(self.work_order_id.clone(), self.work_type()?);
        context.contract_status = self.contract_status.clone();
        context.base_product = self.base_product.clone();
        context.bundle_product = self.bundle_product;
        Ok(context)
    }
}

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validate_url("endpoint", &self.endpoint)?;
        validate_non_empty_string("work_order_id", &self.work_order_id)?;
        self.work_type()?;
        validate_path("draft_dir", &self.draft_dir)?;
        if let Some(rules_file) = &self.rules_file {
            validate_path("rules_file", rules_file)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliConfig {
        let mut argv = vec!["equip-recon"];
        argv.extend_from_slice(args);
        CliConfig::parse_from(argv)
    }

    #[test]
    fn test_defaults_build_install_context() {
        let config = parse(&["--work-order-id", "WO-1"]);
        assert!(config.validate().is_ok());
        let context = config.work_context().unwrap();
        assert_eq!(context.work_type, WorkType::Install);
        assert_eq!(context.contract_status, "20");
        assert!(!context.bundle_product);
    }

    #[test]
    fn test_unknown_work_type_is_rejected() {
        let config = parse(&["--work-order-id", "WO-1", "--work-type", "42"]);
        assert!(matches!(
            config.validate(),
            Err(ReconError::InvalidConfigValueError { .. })
        ));
    }

    #[test]
    fn test_invalid_endpoint_is_rejected() {
        let config = parse(&["--work-order-id", "WO-1", "--endpoint", "ftp://host"]);
        assert!(config.validate().is_err());
    }
}
