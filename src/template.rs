//! Instance bootstrap script templating.
//!
//! Placeholders use the shell's `${NAME}` form. Only bound names are
//! substituted; unbound ones and escaped `\${...}` sequences are left for the
//! shell to expand at boot.

use base64::{engine::general_purpose, Engine as _};
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Bootstrap for the web application: writes its datasource settings and
/// starts the CloudWatch agent.
pub const BOOTSTRAP_TEMPLATE: &str = r#"#!/bin/bash
{
	echo "spring.jpa.hibernate.ddl-auto=create-drop"
	echo "spring.datasource.url=jdbc:mariadb://${HOST}/${DB_NAME}"
	echo "spring.datasource.username=${DB_USER}"
	echo "spring.datasource.password=${DB_PASSWORD}"
	echo "spring.datasource.driver-class-name=org.mariadb.jdbc.Driver"
	echo "spring.jpa.properties.hibernate.dialect=org.hibernate.dialect.MariaDBDialect"
	echo "application.config.csv-file=\${USERS_CSV:users.csv}"
	echo "application.config.sns-topic-arn=${SNS_TOPIC_ARN}"
	echo "logging.level.org.springframework.security=info"
} >> /opt/csye6225/application.properties
sudo chown csye6225:csye6225 /opt/csye6225/application.properties
sudo chmod 640 /opt/csye6225/application.properties
{
	sudo /opt/aws/amazon-cloudwatch-agent/bin/amazon-cloudwatch-agent-ctl \
		-a fetch-config \
		-m ec2 \
		-c file:/opt/aws/amazon-cloudwatch-agent/etc/cloudwatch-config.json \
		-s
}
"#;

/// Placeholder names the bootstrap expects.
pub const HOST: &str = "HOST";
pub const DB_NAME: &str = "DB_NAME";
pub const DB_USER: &str = "DB_USER";
pub const DB_PASSWORD: &str = "DB_PASSWORD";
pub const SNS_TOPIC_ARN: &str = "SNS_TOPIC_ARN";

static PLACEHOLDER_REGEX: OnceLock<Regex> = OnceLock::new();

fn get_placeholder_regex() -> &'static Regex {
    PLACEHOLDER_REGEX.get_or_init(|| {
        Regex::new(r"(\\?)\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("Invalid Regex")
    })
}

/// A script body plus the values bound to its placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    text: String,
    bindings: BTreeMap<String, String>,
}

impl Template {
    pub fn new(text: impl Into<String>) -> Template {
        Template {
            text: text.into(),
            bindings: BTreeMap::new(),
        }
    }

    /// The web application bootstrap.
    pub fn bootstrap() -> Template {
        Template::new(BOOTSTRAP_TEMPLATE)
    }

    /// Bind `placeholder` (without `${}`) to `value`.
    pub fn set(mut self, placeholder: &str, value: impl Into<String>) -> Template {
        self.bindings.insert(placeholder.to_string(), value.into());
        self
    }

    /// Substitute every bound placeholder in a single pass.
    ///
    /// Values are inserted verbatim and never rescanned.
    pub fn render(&self) -> String {
        get_placeholder_regex()
            .replace_all(&self.text, |c: &Captures| {
                if !c[1].is_empty() {
                    return c[0].to_string();
                }
                match self.bindings.get(&c[2]) {
                    Some(value) => value.clone(),
                    None => c[0].to_string(),
                }
            })
            .into_owned()
    }
}

/// Base64 encoding expected by launch templates.
pub fn encode_user_data(script: &str) -> String {
    general_purpose::STANDARD.encode(script.as_bytes())
}
