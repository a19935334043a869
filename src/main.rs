use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chieaqui::config::Config;
use chieaqui::models::complaint::{Complaint, Verdict};
use chieaqui::models::directory::ProfileUpdate;
use chieaqui::models::session::{CompanySignup, ConsumerSignup, Registration, Role, Session};
use chieaqui::services::api::ApiClient;
use chieaqui::services::complaints::{self, ComplaintError, ComplaintService, ComplaintView};
use chieaqui::services::directory::DirectoryService;
use chieaqui::services::lifecycle::Controls;
use chieaqui::services::session::{Access, Route, SessionStore};
use chieaqui::storage::FileStore;

#[derive(Parser)]
#[command(name = "chieaqui", about = "Complaint portal client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum Account {
    User,
    Company,
}

impl From<Account> for Role {
    fn from(a: Account) -> Self {
        match a {
            Account::User => Role::Consumer,
            Account::Company => Role::Company,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum VerdictArg {
    Resolved,
    Unresolved,
}

impl From<VerdictArg> for Verdict {
    fn from(v: VerdictArg) -> Self {
        match v {
            VerdictArg::Resolved => Verdict::Resolved,
            VerdictArg::Unresolved => Verdict::Unresolved,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Log in as a consumer (`user`) or a company
    Login {
        #[arg(long = "as", value_enum)]
        account: Account,
        #[arg(long)]
        email: String,
        #[arg(long, env = "CHIEAQUI_PASSWORD")]
        password: String,
    },
    /// Create an account and log in with it
    Signup {
        #[command(subcommand)]
        account: SignupCommand,
    },
    Logout,
    /// Show the current session
    Whoami,
    Complaint {
        #[command(subcommand)]
        command: ComplaintCommand,
    },
    /// List registered companies
    Companies,
    Profile {
        #[command(subcommand)]
        command: ProfileCommand,
    },
}

#[derive(Subcommand)]
enum SignupCommand {
    Consumer {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "CHIEAQUI_PASSWORD")]
        password: String,
        #[arg(long)]
        cpf: Option<String>,
    },
    Company {
        #[arg(long)]
        legal_name: String,
        #[arg(long)]
        trade_name: Option<String>,
        #[arg(long)]
        cnpj: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "CHIEAQUI_PASSWORD")]
        password: String,
    },
}

#[derive(Subcommand)]
enum ComplaintCommand {
    Show { id: i64 },
    /// Answer a complaint addressed to your company
    Respond {
        id: i64,
        #[arg(long)]
        text: String,
    },
    /// Rule on the company's response and close your complaint
    Finalize {
        id: i64,
        #[arg(long, value_enum)]
        verdict: VerdictArg,
    },
    /// File a new complaint
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        company: i64,
        #[arg(long)]
        description: String,
    },
}

#[derive(Subcommand)]
enum ProfileCommand {
    Show,
    Update {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "")]
        phone: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let api = ApiClient::from_config(&config)?;
    let storage = Arc::new(FileStore::new(config.session_file.clone()));
    let session = Arc::new(SessionStore::new(storage, api));
    session.restore();

    match cli.command {
        Command::Login { account, email, password } => {
            let route = session
                .sign_in(account.into(), &email, &password)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            redirect(route);
        }
        Command::Signup { account } => {
            let registration = match account {
                SignupCommand::Consumer { name, email, password, cpf } => {
                    Registration::Consumer(ConsumerSignup { nome: name, email, password, cpf })
                }
                SignupCommand::Company { legal_name, trade_name, cnpj, email, password } => {
                    Registration::Company(CompanySignup {
                        razao_social: legal_name,
                        nome_social: trade_name,
                        cnpj,
                        email,
                        password,
                    })
                }
            };
            let route = session
                .sign_up(&registration)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            redirect(route);
        }
        Command::Logout => redirect(session.logout().await),
        Command::Whoami => match session.current() {
            Some(s) => print_session(&s),
            None => println!("Not logged in."),
        },
        Command::Complaint { command } => run_complaint(session, command).await?,
        Command::Companies => {
            let directory = DirectoryService::new(session);
            let companies = directory
                .list_companies()
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            if companies.is_empty() {
                println!("No companies registered.");
            }
            for c in companies {
                println!("#{:<6} {} <{}> CNPJ {}", c.display_id, c.razao_social, c.display_email, c.cnpj);
            }
        }
        Command::Profile { command } => {
            require(&session, Role::Consumer)?;
            let directory = DirectoryService::new(session);
            let profile = match command {
                ProfileCommand::Show => directory.own_profile().await,
                ProfileCommand::Update { name, email, phone } => {
                    directory
                        .update_profile(&ProfileUpdate { nome: name, email, phone })
                        .await
                }
            }
            .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            println!("{} <{}>", profile.nome, profile.email);
            if let Some(phone) = profile.phone.filter(|p| !p.is_empty()) {
                println!("phone: {phone}");
            }
            println!("member since {}", profile.date_joined);
        }
    }

    Ok(())
}

async fn run_complaint(session: Arc<SessionStore>, command: ComplaintCommand) -> anyhow::Result<()> {
    let service = ComplaintService::new(session.clone());

    match command {
        ComplaintCommand::Show { id } => {
            if session.current().is_none() {
                redirect(Route::Login);
                return Ok(());
            }
            let view = service.load(id).await.map_err(|e| surface(e, "Failed to load complaint."))?;
            print_complaint(&view, session.current().as_ref());
        }
        ComplaintCommand::Respond { id, text } => {
            require(&session, Role::Company)?;
            let view = service.load(id).await.map_err(|e| surface(e, "Failed to load complaint."))?;
            if view.controls != Controls::Respond {
                anyhow::bail!("Complaint #{id} cannot be answered by this account.");
            }
            let view = service
                .respond(&view.complaint, &text)
                .await
                .map_err(|e| surface(e, "Failed to submit response."))?;
            println!("Response sent.");
            print_complaint(&view, session.current().as_ref());
        }
        ComplaintCommand::Finalize { id, verdict } => {
            require(&session, Role::Consumer)?;
            let view = service.load(id).await.map_err(|e| surface(e, "Failed to load complaint."))?;
            if view.controls != Controls::Finalize {
                anyhow::bail!("Complaint #{id} cannot be finalized by this account.");
            }
            let verdict: Verdict = verdict.into();
            let view = service
                .finalize(&view.complaint, verdict)
                .await
                .map_err(|e| surface(e, "Failed to finalize complaint."))?;
            println!("Complaint marked as {}.", verdict.resolution());
            print_complaint(&view, session.current().as_ref());
        }
        ComplaintCommand::Create { title, company, description } => {
            require(&session, Role::Consumer)?;
            let view = service
                .create(&title, company, &description)
                .await
                .map_err(|e| surface(e, "Failed to submit complaint."))?;
            println!("Complaint #{} created.", view.complaint.id);
        }
    }
    Ok(())
}

/// Role guard for commands that belong to one role's pages.
fn require(session: &SessionStore, role: Role) -> anyhow::Result<Session> {
    match session.require_role(role) {
        Access::Granted(s) => Ok(s),
        Access::RedirectToLogin => {
            redirect(Route::Login);
            anyhow::bail!("Login required.")
        }
        Access::Denied { expected, actual } => {
            anyhow::bail!("Access denied: this requires a {expected} account, you are logged in as {actual}.")
        }
    }
}

fn surface(err: ComplaintError, generic: &str) -> anyhow::Error {
    if let ComplaintError::SessionExpired(route) = &err {
        redirect(*route);
    }
    anyhow::anyhow!(err.user_message(generic))
}

fn redirect(route: Route) {
    println!("-> {route}");
}

fn print_session(s: &Session) {
    let name = s.identity.display_name().unwrap_or("-");
    println!("{} {} <{}>", s.role(), name, s.identity.email());
}

fn print_complaint(view: &ComplaintView, session: Option<&Session>) {
    let c: &Complaint = &view.complaint;
    println!("#{} {} [{}]", c.id, c.title, c.status);
    println!(
        "by {} against {} on {}",
        c.consumer_name.as_deref().unwrap_or("-"),
        c.company_name.as_deref().unwrap_or("-"),
        c.created_at.format("%d/%m/%Y %H:%M")
    );
    if let Some(s) = session {
        println!("({})", complaints::describe_party(&s.identity, c));
    }
    println!();
    println!("{}", c.description);

    for a in &c.attachments {
        println!("attachment: {} {}", a.file_name, a.url);
    }

    if let Some(r) = &c.response {
        println!();
        println!("Company response [{}] on {}", r.resolution_status, r.created_at.format("%d/%m/%Y %H:%M"));
        println!("{}", r.description);
    }

    match view.controls {
        Controls::Respond => println!("\nAwaiting your response: chieaqui complaint respond {} --text ...", c.id),
        Controls::Finalize => println!(
            "\nRate the response: chieaqui complaint finalize {} --verdict resolved|unresolved",
            c.id
        ),
        Controls::ReadOnly => {}
    }
}
