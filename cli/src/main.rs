//! `openglot` — terminal client for OpenGlot account and session management.

mod callback;

use std::time::Duration;

use anyhow::anyhow;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use openglot_auth::AuthConfig;
use openglot_auth::AuthGateway;
use openglot_auth::IdentityProvider;
use openglot_auth::SessionController;
use openglot_auth::SignInOutcome;
use openglot_auth::TokenStore;
use tracing_subscriber::EnvFilter;

use crate::callback::CallbackListener;

/// How long to keep the loopback listener open for the hosted-UI redirect.
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Parser)]
#[command(name = "openglot", about = "OpenGlot account and session management")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show whether a session is established and for whom.
    Status,
    /// Register a new account.
    Signup {
        #[arg(long)]
        email: String,
        /// Display name for the new account.
        #[arg(long)]
        name: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        confirm_password: String,
    },
    /// Confirm a pending sign-up with the emailed code.
    Confirm {
        code: String,
    },
    /// Email a fresh confirmation code for the pending sign-up.
    ResendCode,
    /// Sign in with credentials, or via a third-party provider.
    Login {
        #[arg(long, required_unless_present = "provider")]
        email: Option<String>,
        #[arg(long, required_unless_present = "provider")]
        password: Option<String>,
        /// Sign in through the hosted UI with this provider instead.
        #[arg(long, value_enum, conflicts_with_all = ["email", "password"])]
        provider: Option<ProviderArg>,
    },
    /// Start password recovery: the provider emails a reset code.
    ForgotPassword {
        email: String,
    },
    /// Complete password recovery with the emailed code.
    ResetPassword {
        #[arg(long)]
        email: String,
        #[arg(long)]
        code: String,
        #[arg(long)]
        new_password: String,
        #[arg(long)]
        confirm_password: String,
    },
    /// Sign out and discard stored tokens.
    Logout,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProviderArg {
    Google,
    Facebook,
}

impl From<ProviderArg> for IdentityProvider {
    fn from(provider: ProviderArg) -> Self {
        match provider {
            ProviderArg::Google => IdentityProvider::Google,
            ProviderArg::Facebook => IdentityProvider::Facebook,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = AuthConfig::from_env();
    let gateway = AuthGateway::new(reqwest::Client::new(), config);
    let controller = SessionController::new(gateway, TokenStore::new()?);

    match cli.command {
        Command::Status => {
            controller.bootstrap().await;
            let session = controller.session();
            match session.user {
                Some(user) => println!("Signed in as {} <{}>", user.name, user.email),
                None => println!("Signed out"),
            }
        }
        Command::Signup {
            email,
            name,
            password,
            confirm_password,
        } => {
            controller
                .sign_up(&email, &password, &confirm_password, &name)
                .await?;
            println!("Account created. Check {email} for a confirmation code,");
            println!("then run: openglot confirm <code>");
        }
        Command::Confirm { code } => {
            controller.confirm_sign_up(&code).await?;
            println!("Account confirmed. Sign in with: openglot login");
        }
        Command::ResendCode => {
            controller.resend_confirmation_code().await?;
            println!("Confirmation code resent.");
        }
        Command::Login {
            provider: Some(provider),
            ..
        } => {
            let outcome = provider_login(&controller, provider.into()).await?;
            report_sign_in(&controller, outcome);
        }
        Command::Login {
            email,
            password,
            provider: None,
        } => {
            let (email, password) = email
                .zip(password)
                .ok_or_else(|| anyhow!("--email and --password are required"))?;
            let outcome = controller.sign_in(&email, &password).await?;
            report_sign_in(&controller, outcome);
        }
        Command::ForgotPassword { email } => {
            controller.forgot_password(&email).await?;
            println!("Check {email} for a reset code, then run: openglot reset-password");
        }
        Command::ResetPassword {
            email,
            code,
            new_password,
            confirm_password,
        } => {
            controller
                .reset_password(&email, &code, &new_password, &confirm_password)
                .await?;
            println!("Password updated. Sign in with: openglot login");
        }
        Command::Logout => {
            controller.sign_out();
            println!("Signed out.");
        }
    }

    Ok(())
}

/// Hosted-UI sign-in: open the provider page in the browser, catch the
/// redirect on the loopback listener, and complete the session from it.
async fn provider_login(
    controller: &SessionController,
    provider: IdentityProvider,
) -> anyhow::Result<SignInOutcome> {
    let listener = CallbackListener::bind(&controller.gateway().config().redirect_sign_in)?;

    let authorize_url = controller.gateway().provider_redirect_url(provider);
    if webbrowser::open(&authorize_url).is_err() {
        println!("Open this URL in your browser to continue:\n\n  {authorize_url}\n");
    } else {
        println!("Complete the sign-in in your browser...");
    }

    let redirect_url =
        tokio::task::spawn_blocking(move || listener.wait_for_redirect(CALLBACK_TIMEOUT)).await??;
    tracing::debug!("received hosted-UI redirect");

    Ok(controller.handle_oauth_callback(&redirect_url).await?)
}

fn report_sign_in(controller: &SessionController, outcome: SignInOutcome) {
    match outcome {
        SignInOutcome::SignedIn => {
            if let Some(user) = controller.session().user {
                println!("Signed in as {} <{}>", user.name, user.email);
            } else {
                println!("Signed in.");
            }
        }
        SignInOutcome::ProfileIncomplete => {
            println!("Signed in. Your profile is incomplete; finish it in the OpenGlot app.");
        }
        SignInOutcome::Superseded => {
            println!("Sign-in was superseded by a sign-out and discarded.");
        }
    }
}
