use crate::settings::{AccountSettings, Settings};
use anyhow::Result;
use quotaguard_providers::{CloudProvider, NotificationChannel};

pub struct ProviderManager;

impl ProviderManager {
    /// Builds the cloud provider bound to one account's credentials.
    pub fn get_provider(settings: &Settings, account: &AccountSettings) -> Result<Box<dyn CloudProvider>> {
        match settings.provider.as_str() {
            #[cfg(feature = "provider-lighthouse")]
            "lighthouse" => Ok(Box::new(
                quotaguard_providers::lighthouse::LighthouseProvider::new(
                    account.secret_id.clone(),
                    account.secret_key.clone(),
                )?,
            )),
            #[cfg(feature = "provider-mock")]
            "mock" => {
                let provider = match settings.mock_fixture_file.as_deref() {
                    Some(path) => {
                        let json = std::fs::read_to_string(path)?;
                        quotaguard_providers::mock::MockProvider::from_fixture(&json)?
                    }
                    None => quotaguard_providers::mock::MockProvider::new(),
                };
                Ok(Box::new(provider))
            }
            other => Err(anyhow::anyhow!(
                "provider {:?} is not compiled into this build",
                other
            )),
        }
    }

    /// Builds the notification channel. Telegram resolves its recipient here,
    /// so a failure means no cycle should run.
    pub async fn get_channel(settings: &Settings) -> Result<Box<dyn NotificationChannel>> {
        match settings.notifier.as_str() {
            #[cfg(feature = "notify-telegram")]
            "telegram" => {
                let token = settings
                    .telegram_token
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("TELEGRAM_BOT_TOKEN is not set"))?;
                let channel = quotaguard_providers::telegram::TelegramChannel::connect(
                    token,
                    settings.telegram_chat_id.clone(),
                )
                .await?;
                Ok(Box::new(channel))
            }
            #[cfg(feature = "provider-mock")]
            "mock" => Ok(Box::new(quotaguard_providers::mock::MockChannel::new())),
            other => Err(anyhow::anyhow!(
                "notifier {:?} is not compiled into this build",
                other
            )),
        }
    }
}
