//! services/client/src/bin/daily_gk.rs

use chrono::NaiveDate;
use clap::Parser;
use client_lib::{
    adapters::{SupabaseAuthAdapter, SupabaseDataAdapter, SupabaseHttp},
    app::{auth_flow, AppState, CacheEntry, Notice},
    config::Config,
    error::ClientError,
};
use daily_gk_core::domain::{QuizAnswers, ReadinessState};
use daily_gk_core::ports::{Navigator, RESET_PASSWORD_ROUTE};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "daily_gk")]
#[command(version = "0.1")]
#[command(about = "Daily GK: daily current-affairs summaries, quizzes and digests")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Account email
    #[arg(long, global = true, env = "DAILY_GK_EMAIL")]
    email: Option<String>,

    /// Account password
    #[arg(long, global = true, env = "DAILY_GK_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

impl Cli {
    fn credentials(&self) -> Result<(&str, &str), ClientError> {
        match (self.email.as_deref(), self.password.as_deref()) {
            (Some(email), Some(password)) => Ok((email, password)),
            _ => Err(ClientError::Internal(
                "--email and --password are required for this command".to_string(),
            )),
        }
    }
}

#[derive(clap::Subcommand)]
enum Commands {
    /// List the latest summaries, or those of one day
    Summaries {
        #[arg(long, value_name = "YYYY-MM-DD")]
        date: Option<NaiveDate>,
    },
    /// Show one summary
    Summary { id: String },
    /// Show your account information (signs in)
    Profile {
        /// Sign out once the profile is shown
        #[arg(long)]
        sign_out: bool,
    },
    /// List your bookmarks (signs in)
    Bookmarks,
    /// Add or remove a bookmark (signs in)
    ToggleBookmark { summary_id: String },
    /// Show a day's quiz, optionally scoring answers given as option indexes
    Quiz {
        #[arg(long, value_name = "YYYY-MM-DD")]
        date: Option<NaiveDate>,
        #[arg(long, value_delimiter = ',')]
        answers: Vec<usize>,
    },
    /// List the weekly digests
    Digests,
    /// Download a weekly digest
    Download {
        name: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Create an account
    SignUp {
        #[arg(long)]
        name: Option<String>,
    },
    /// Email a password reset link
    ForgotPassword,
    /// Complete a password reset from the link in the email
    Recover {
        /// The full redirect URL the reset link opened
        url: String,
        #[arg(long)]
        new_password: String,
        #[arg(long)]
        confirm: Option<String>,
    },
}

impl Commands {
    fn requires_session(&self) -> bool {
        matches!(
            self,
            Commands::Profile { .. } | Commands::Bookmarks | Commands::ToggleBookmark { .. }
        )
    }
}

/// Stands in for the router of a graphical front end.
#[derive(Default)]
struct TerminalNavigator {
    current: Mutex<Option<String>>,
}

impl TerminalNavigator {
    fn current(&self) -> Option<String> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Navigator for TerminalNavigator {
    fn replace(&self, route: &str) {
        info!(route, "Navigating");
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(route.to_string());
    }
}

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    let cli = Cli::parse();

    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    info!("Configuration loaded. Starting client...");

    // --- 2. Initialize Service Adapters ---
    let http = SupabaseHttp::new(
        config.supabase_url.clone(),
        config.supabase_anon_key.clone(),
        config.http_timeout,
    )?;
    let auth = Arc::new(SupabaseAuthAdapter::new(http.clone()));
    let data = Arc::new(SupabaseDataAdapter::new(http, auth.clone()));
    let navigator = Arc::new(TerminalNavigator::default());

    let refresh_cancel = CancellationToken::new();
    let refresh_task = auth.clone().spawn_auto_refresh(refresh_cancel.clone());

    // --- 3. Start the Application State ---
    let state = AppState::start(config.clone(), auth.clone(), data, navigator.clone());
    if tokio::time::timeout(config.http_timeout, state.session.wait_until_resolved())
        .await
        .is_err()
    {
        warn!("Initial session not resolved in time, retrying once");
        state.retry_initial_session().await?;
    }

    // --- 4. Run the Command ---
    let result = run(&cli, &state, &auth, &navigator).await;

    if state.session.readiness() == ReadinessState::Authenticated {
        if let Err(e) = state.session.sign_out().await {
            warn!(error = %e, "Sign-out on exit failed");
        }
    }
    SupabaseAuthAdapter::stop_auto_refresh(&refresh_cancel, refresh_task).await;
    state.shutdown().await;
    result
}

async fn run(
    cli: &Cli,
    state: &AppState,
    auth: &SupabaseAuthAdapter,
    navigator: &TerminalNavigator,
) -> Result<(), ClientError> {
    if cli.command.requires_session() {
        let (email, password) = cli.credentials()?;
        if let Some(notice) = auth_flow::submit_sign_in(&state.session, email, password).await {
            return report(notice);
        }
        let mut session = state.session.subscribe();
        session
            .wait_for(|s| s.readiness == ReadinessState::Authenticated)
            .await
            .map(|_| ())
            .map_err(|_| ClientError::Internal("Session store closed".to_string()))?;
    }
    let user_id = state.session.snapshot().user_id().map(str::to_string);

    match &cli.command {
        Commands::Summaries { date } => {
            let entry = match date {
                Some(date) => state.queries.summaries_on(*date).await,
                None => state.queries.latest_summaries().await,
            };
            let summaries = ready(entry)?;
            if summaries.is_empty() {
                println!("No summaries available yet.");
            }
            for summary in summaries.iter() {
                println!("{}  {}  [{}]  {}", summary.date, summary.id, summary.tags.join(", "), summary.title);
            }
        }
        Commands::Summary { id } => match &*ready(state.queries.summary(id).await)? {
            Some(summary) => {
                println!("{}\n{}\n", summary.title, summary.date);
                for paragraph in summary.paragraphs() {
                    println!("{}\n", paragraph);
                }
                if let Some(source) = &summary.source_url {
                    println!("Source: {}", source);
                }
            }
            None => println!("Summary not found."),
        },
        Commands::Profile { sign_out } => {
            let Some(user) = state.session.snapshot().user().cloned() else {
                println!("Not signed in.");
                return Ok(());
            };
            if let Some(name) = &user.display_name {
                println!("Name:     {}", name);
            }
            println!("Email:    {}", user.email.as_deref().unwrap_or("-"));
            println!("Status:   {}", user.verification_label());
            println!("Joined:   {}", user.joined_on().as_deref().unwrap_or("-"));
            if *sign_out {
                state.session.sign_out().await?;
                println!("Signed out.");
            }
        }
        Commands::Bookmarks => {
            let bookmarks = ready(state.queries.bookmarks(user_id.as_deref()).await)?;
            if bookmarks.is_empty() {
                println!("No bookmarks yet.");
            }
            for item in bookmarks.iter() {
                match &item.summary {
                    Some(summary) => println!("{}  {}  {}", summary.date, summary.id, summary.title),
                    None => println!("(summary removed)  bookmark {}", item.bookmark_id),
                }
            }
        }
        Commands::ToggleBookmark { summary_id } => {
            let user_id = user_id
                .ok_or_else(|| ClientError::Internal("Not signed in".to_string()))?;
            let notice = match state.mutations.toggle_bookmark(summary_id, &user_id).await {
                Ok(outcome) => Notice::for_toggle(&outcome),
                Err(_) => Notice::toggle_failed(),
            };
            return report(notice);
        }
        Commands::Quiz { date, answers } => {
            let entry = match date {
                Some(date) => state.queries.quiz_for(*date).await,
                None => state.queries.todays_quiz().await,
            };
            let quiz = ready(entry)?;
            let Some(quiz) = (*quiz).as_ref() else {
                println!("No quiz available for today.");
                return Ok(());
            };
            let mut picks = QuizAnswers::new();
            for (index, question) in quiz.questions.iter().enumerate() {
                println!("{}. {}", index + 1, question.question);
                for (option, text) in question.options.iter().enumerate() {
                    println!("   {}) {}", option, text);
                }
                if let Some(&pick) = answers.get(index) {
                    match picks.select(quiz, index, pick) {
                        Some(true) => println!("   -> {} is correct", pick),
                        Some(false) => println!(
                            "   -> {} is wrong, the answer is {}",
                            pick, question.correct_answer
                        ),
                        None => println!("   -> {} is not an option", pick),
                    }
                }
            }
            if !answers.is_empty() {
                println!("Score: {}/{}", picks.score(quiz), quiz.questions.len());
            }
        }
        Commands::Digests => {
            let files = ready(state.queries.digest_files().await)?;
            if files.is_empty() {
                println!("No digests available yet.");
            }
            for file in files.iter() {
                let created = file
                    .created_at
                    .map(|at| at.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("{}  {}", created, file.name);
            }
        }
        Commands::Download { name, out } => {
            let bytes = state.queries.download_digest(name).await?;
            let path = out.clone().unwrap_or_else(|| PathBuf::from(name));
            tokio::fs::write(&path, &bytes).await?;
            println!("Saved {} ({} bytes)", path.display(), bytes.len());
        }
        Commands::SignUp { name } => {
            let (email, password) = cli.credentials()?;
            let notice =
                auth_flow::submit_sign_up(&state.session, email, password, name.as_deref()).await;
            return report(notice);
        }
        Commands::ForgotPassword => {
            let email = cli
                .email
                .as_deref()
                .ok_or_else(|| ClientError::Internal("--email is required".to_string()))?;
            let notice = auth_flow::submit_password_reset_request(&state.session, email).await;
            return report(notice);
        }
        Commands::Recover { url, new_password, confirm } => {
            auth.handle_recovery_redirect(url).await?;
            let mut session = state.session.subscribe();
            session
                .wait_for(|s| s.session.is_some())
                .await
                .map(|_| ())
                .map_err(|_| ClientError::Internal("Session store closed".to_string()))?;
            if navigator.current().as_deref() != Some(RESET_PASSWORD_ROUTE) {
                warn!("Recovery session arrived without a redirect");
            }
            let confirm = confirm.as_deref().unwrap_or(new_password.as_str());
            let notice = auth_flow::submit_new_password(&state.session, new_password, confirm).await;
            return report(notice);
        }
    }
    Ok(())
}

fn ready<T>(entry: CacheEntry<T>) -> Result<Arc<T>, ClientError> {
    Ok(entry.into_result()?)
}

fn report(notice: Notice) -> Result<(), ClientError> {
    println!("{}", notice);
    if notice.is_error() {
        return Err(ClientError::Internal(notice.description().to_string()));
    }
    Ok(())
}
