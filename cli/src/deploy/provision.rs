//! Service start stage — runtime install, reverse proxy, certificates,
//! and the service restart itself. Each optional step sits behind a
//! skip flag on the deploy command.

use crate::output::OutputContext;
use crate::remote::{Remote, shell_quote};

use super::{DeploySettings, exec_ok, exec_ok_with_stdin};

/// Install the Python runtime into the active slot.
///
/// A slot without a `requirements.txt` is left alone — not every
/// deployable tree ships one.
#[must_use]
pub fn runtime_install_command(settings: &DeploySettings) -> String {
    format!(
        "cd {slot} && if [ -f requirements.txt ]; then \
         python3 -m venv .venv && .venv/bin/pip install --quiet -r requirements.txt; fi",
        slot = shell_quote(&settings.active_slot())
    )
}

/// Restart the service unit.
#[must_use]
pub fn restart_command(settings: &DeploySettings) -> String {
    format!("sudo systemctl restart {}", shell_quote(&settings.unit))
}

/// Stop the service unit.
#[must_use]
pub fn stop_command(settings: &DeploySettings) -> String {
    format!("sudo systemctl stop {}", shell_quote(&settings.unit))
}

/// Rendered nginx server block proxying the domain to the service port.
#[must_use]
pub fn nginx_site(domain: &str, service_port: u16) -> String {
    format!(
        r"server {{
    listen 80;
    server_name {domain};

    location / {{
        proxy_pass http://127.0.0.1:{service_port};
        proxy_set_header Host $host;
        proxy_set_header X-Real-IP $remote_addr;
        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
        proxy_set_header X-Forwarded-Proto $scheme;
    }}
}}
"
    )
}

/// Write the rendered site config (piped over stdin).
#[must_use]
pub fn proxy_install_command(settings: &DeploySettings) -> String {
    format!(
        "sudo tee /etc/nginx/sites-available/{unit} > /dev/null",
        unit = shell_quote(&settings.unit)
    )
}

/// Enable the site, validate the config, reload nginx.
#[must_use]
pub fn proxy_enable_command(settings: &DeploySettings) -> String {
    let unit = shell_quote(&settings.unit);
    format!(
        "sudo ln -sf /etc/nginx/sites-available/{unit} /etc/nginx/sites-enabled/{unit} \
         && sudo nginx -t && sudo systemctl reload nginx"
    )
}

/// Issue a certificate for the domain via certbot.
#[must_use]
pub fn certbot_command(domain: &str) -> String {
    format!(
        "sudo certbot --nginx --non-interactive --agree-tos \
         --register-unsafely-without-email -d {}",
        shell_quote(domain)
    )
}

/// Execute the start stage against the remote host.
///
/// Runtime install, proxy setup, and the restart are fatal on failure
/// (the caller rolls back). Certificate issuance only warns.
///
/// # Errors
///
/// Returns the failure reason when a fatal step fails.
pub async fn run(
    remote: &impl Remote,
    settings: &DeploySettings,
    ctx: &OutputContext,
) -> Result<(), String> {
    if settings.skip_runtime {
        ctx.kv("Runtime", "skipped");
    } else {
        exec_ok(remote, &runtime_install_command(settings)).await?;
    }

    if let Some(domain) = &settings.domain {
        if settings.skip_proxy {
            ctx.kv("Proxy", "skipped");
        } else {
            let site = nginx_site(domain, settings.service_port);
            exec_ok_with_stdin(remote, &proxy_install_command(settings), site.as_bytes()).await?;
            exec_ok(remote, &proxy_enable_command(settings)).await?;
        }

        if settings.skip_certs {
            ctx.kv("Certificates", "skipped");
        } else if let Err(reason) = exec_ok(remote, &certbot_command(domain)).await {
            ctx.warn(&format!("certificate issuance failed: {reason}"));
        }
    }

    exec_ok(remote, &restart_command(settings)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::test_settings;

    #[test]
    fn runtime_install_is_conditional_on_requirements() {
        let cmd = runtime_install_command(&test_settings());
        assert!(cmd.contains("'/opt/outfit-api/current'"));
        assert!(cmd.contains("if [ -f requirements.txt ]"));
        assert!(cmd.contains("python3 -m venv"));
    }

    #[test]
    fn restart_and_stop_target_the_unit() {
        let settings = test_settings();
        assert_eq!(
            restart_command(&settings),
            "sudo systemctl restart 'outfit-api'"
        );
        assert_eq!(stop_command(&settings), "sudo systemctl stop 'outfit-api'");
    }

    #[test]
    fn nginx_site_proxies_domain_to_service_port() {
        let site = nginx_site("outfit.example.com", 8000);
        assert!(site.contains("server_name outfit.example.com;"));
        assert!(site.contains("proxy_pass http://127.0.0.1:8000;"));
        assert!(site.contains("listen 80;"));
    }

    #[test]
    fn proxy_commands_validate_before_reload() {
        let cmd = proxy_enable_command(&test_settings());
        let test_pos = cmd.find("nginx -t").expect("nginx -t present");
        let reload_pos = cmd.find("reload nginx").expect("reload present");
        assert!(test_pos < reload_pos, "config check must precede reload");
    }

    #[test]
    fn certbot_command_is_non_interactive() {
        let cmd = certbot_command("outfit.example.com");
        assert!(cmd.contains("--non-interactive"));
        assert!(cmd.contains("-d 'outfit.example.com'"));
    }
}
