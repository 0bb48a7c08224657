use std::sync::Arc;

use color_eyre::Result;
use url::Url;

use crate::api::cached_client::{CachedApiClient, Fetched, MutationOutcome, Source};
use crate::api::client::ApiClient;
use crate::api::types::{current_assignment, queue_view, Assignment, Task};
use crate::cache::{Cache, KvStorage};
use crate::classify::{classify, describe, ErrorHandler, ErrorKind, Presenter};
use crate::config::Config;
use crate::error::ApiError;
use crate::net::{AnyConnectivity, Connectivity, ProbeConnectivity, StaticConnectivity};
use crate::queue::PendingQueue;
use crate::sync::{SyncCoordinator, SyncReport};
use crate::Command;

const LOGIN_HINT: &str = "Run `fieldq login --email <email>` to sign in.";

/// Writes alerts to stderr.
pub struct ConsolePresenter;

impl Presenter for ConsolePresenter {
  fn alert(&self, title: &str, message: &str) {
    eprintln!("{}: {}", title, message);
  }

  fn redirect_to_login(&self) {
    eprintln!("{}", describe(ErrorKind::Auth, None));
    eprintln!("{}", LOGIN_HINT);
  }
}

/// Main application state
pub struct App<S: KvStorage, P: Presenter> {
  config: Config,
  client: CachedApiClient<S, AnyConnectivity>,
  errors: Arc<ErrorHandler<S, AnyConnectivity, P>>,
  sync: SyncCoordinator<S, AnyConnectivity, P>,
}

impl<S: KvStorage, P: Presenter> App<S, P> {
  pub fn new(config: Config, storage: S, offline: bool, presenter: P) -> Result<Self> {
    let api = ApiClient::new(config.api_url(), config.request_timeout())?;

    let connectivity = if offline {
      AnyConnectivity::Static(StaticConnectivity::new(false))
    } else {
      let target = Url::parse(config.api_url())?;
      AnyConnectivity::Probe(ProbeConnectivity::new(target, config.probe_timeout())?)
    };

    let cache = Cache::new(storage);
    let queue = PendingQueue::new(cache.clone());

    let client = CachedApiClient::new(
      api.clone(),
      cache.clone(),
      queue.clone(),
      connectivity.clone(),
    );
    let errors = Arc::new(ErrorHandler::new(
      cache.clone(),
      connectivity.clone(),
      presenter,
    ));
    let sync = SyncCoordinator::new(api, cache, queue, connectivity, Arc::clone(&errors));

    Ok(Self {
      config,
      client,
      errors,
      sync,
    })
  }

  /// Run one command. Returns false when the command failed; the failure
  /// has already been shown to the user.
  pub async fn run(&self, command: Command) -> Result<bool> {
    let outcome = match command {
      Command::Login { email, password } => {
        let password = password.unwrap_or_default();
        return Ok(self.login(&email, &password).await);
      }
      Command::Logout => {
        self.client.logout();
        println!("Signed out.");
        Ok(())
      }
      Command::Whoami => self.whoami(),
      Command::Assignments => self.assignments().await,
      Command::Show { assignment_id } => self.show(&assignment_id).await,
      Command::Start { assignment_id } => self.start(&assignment_id).await,
      Command::Complete { task_id } => self.complete(&task_id).await,
      Command::Pending => {
        self.pending();
        Ok(())
      }
      Command::Sync { watch: true } => {
        self.watch().await;
        Ok(())
      }
      Command::Sync { watch: false } => return Ok(self.sync_once().await),
    };

    match outcome {
      Ok(()) => Ok(true),
      Err((error, context)) => {
        self.report(&error, context).await;
        Ok(false)
      }
    }
  }

  async fn report(&self, error: &ApiError, context: &str) {
    if *error == ApiError::NotSignedIn {
      self.errors.presenter().alert("Not signed in", LOGIN_HINT);
      return;
    }
    self.errors.handle(error, context, true).await;
  }

  async fn login(&self, email: &str, password: &str) -> bool {
    let presenter = self.errors.presenter();
    if email.is_empty() || password.is_empty() {
      presenter.alert("Error", "Email and password required");
      return false;
    }

    match self.client.login(email, password).await {
      Ok(session) => {
        println!("Signed in as {}.", session.user.display_name());
        true
      }
      Err(ApiError::AccessDenied) => {
        presenter.alert("Access Denied", "App for technicians only");
        false
      }
      Err(e) => {
        tracing::error!(context = "login", error = %e, "Login failed");
        let message = match &e {
          ApiError::Status { message, .. } => message.clone().unwrap_or_else(|| "Login failed".into()),
          other => {
            let online = self.client.connectivity().is_online().await;
            classify(Some(other), online).message
          }
        };
        presenter.alert("Login Failed", &message);
        false
      }
    }
  }

  fn whoami(&self) -> Result<(), (ApiError, &'static str)> {
    let session = self.client.session().map_err(|e| (e, "whoami"))?;
    let user = &session.user;
    println!("{}", user.display_name());
    println!("  role: {}", user.role);
    println!("  team: {}", user.team_id.as_deref().unwrap_or("-"));
    println!("  server: {}", self.config.api_url());
    Ok(())
  }

  async fn assignments(&self) -> Result<(), (ApiError, &'static str)> {
    let fetched = self
      .client
      .assignments()
      .await
      .map_err(|e| (e, "assignments"))?;
    print_offline_notice(&fetched);

    let all = fetched.data;
    if let Some(current) = current_assignment(&all) {
      println!(
        "Continue: {} ({})  [{}]",
        current.category,
        current.subcategory_or_default(),
        current.id
      );
      println!();
    }

    let open = queue_view(&all);
    if open.is_empty() {
      println!("No assignments in queue");
      return Ok(());
    }
    for assignment in open {
      print_assignment_row(assignment);
    }
    Ok(())
  }

  async fn show(&self, assignment_id: &str) -> Result<(), (ApiError, &'static str)> {
    let fetched = self
      .client
      .assignment(assignment_id)
      .await
      .map_err(|e| (e, "assignment-detail"))?;
    print_offline_notice(&fetched);

    let (assignment, tasks) = &fetched.data;
    println!(
      "{} [{}]",
      assignment.category,
      assignment.priority_level.as_deref().unwrap_or("-")
    );
    println!("{}", assignment.subcategory_or_default());
    println!("Status: {}", assignment.status);
    println!();

    let done = tasks.iter().filter(|t| t.is_completed()).count();
    println!("Tasks ({}/{} completed)", done, tasks.len());
    for task in tasks {
      print_task_row(task);
    }
    Ok(())
  }

  async fn start(&self, assignment_id: &str) -> Result<(), (ApiError, &'static str)> {
    let outcome = self
      .client
      .start_assignment(assignment_id)
      .await
      .map_err(|e| (e, "start-assignment"))?;

    match outcome {
      MutationOutcome::Applied(()) => println!("Assignment {} started.", assignment_id),
      MutationOutcome::Queued { persisted } => print_queued(persisted),
    }
    Ok(())
  }

  async fn complete(&self, task_id: &str) -> Result<(), (ApiError, &'static str)> {
    let outcome = self
      .client
      .complete_task(task_id)
      .await
      .map_err(|e| (e, "complete-task"))?;

    match outcome {
      MutationOutcome::Applied(response) => {
        println!("Task {} completed.", task_id);
        if response.assignment_completed {
          println!("Assignment Completed: All tasks for this assignment have been completed!");
        }
      }
      MutationOutcome::Queued { persisted } => print_queued(persisted),
    }
    Ok(())
  }

  fn pending(&self) {
    let actions = self.client.queue().pending();
    if actions.is_empty() {
      println!("No pending actions.");
      return;
    }
    for action in actions {
      println!(
        "{}  {:<17} {}  {}",
        action.id, action.action, action.timestamp, action.payload
      );
    }
  }

  /// One sync pass. False when any replay failed.
  async fn sync_once(&self) -> bool {
    let report = self.sync.run().await;
    if report.offline {
      println!("{}", describe(ErrorKind::Offline, None));
      println!("{} action(s) still pending.", self.client.queue().len());
      return true;
    }
    print_report(&report);
    report.failed() == 0
  }

  async fn watch(&self) {
    let interval = self.config.sync_interval();
    println!(
      "Watching for connectivity every {}s (Ctrl-C to stop)...",
      interval.as_secs()
    );
    self.sync.watch(interval, print_report).await;
  }
}

fn print_offline_notice<T>(fetched: &Fetched<T>) {
  if fetched.source == Source::Offline {
    println!("{} Showing saved data.", describe(ErrorKind::Offline, None));
    println!();
  }
}

fn print_queued(persisted: bool) {
  println!("{}", describe(ErrorKind::Offline, None));
  if persisted {
    println!("Saved. It will be sent on the next `fieldq sync`.");
  } else {
    eprintln!("Could not save the change for later. Please try again.");
  }
}

fn print_assignment_row(assignment: &Assignment) {
  let status = if assignment.is_in_progress() {
    "In Progress"
  } else {
    "Queued"
  };
  println!(
    "{:<8} {:<4} {:<24} {:<20} {}",
    assignment.id,
    assignment.priority_level.as_deref().unwrap_or("-"),
    assignment.category,
    assignment.subcategory_or_default(),
    status
  );
}

fn print_task_row(task: &Task) {
  let mark = if task.is_completed() { "x" } else { " " };
  println!("  [{}] {:<8} {}", mark, task.id, task.name);
  if let Some(description) = task.description.as_deref().filter(|d| !d.is_empty()) {
    println!("               {}", description);
  }
}

fn print_report(report: &SyncReport) {
  if report.results.is_empty() {
    println!("Nothing to sync.");
    return;
  }
  println!(
    "Synced {} action(s), {} failed.",
    report.succeeded(),
    report.failed()
  );
  for result in report.results.iter().filter(|r| !r.success) {
    // Raw reasons go to the log; the user sees which action is still waiting
    println!("  still pending: {} {}", result.action.action, result.action.payload);
  }
  for assignment in &report.completed_assignments {
    println!("Assignment {} completed.", assignment);
  }
}
