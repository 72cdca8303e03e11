use std::io;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use crossterm::{
    cursor::{Hide, Show},
    event::{self, Event, KeyCode},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ecosim_app::StartRequest;
use ecosim_core::{EntityKind, GridSnapshot, IterationSummary};
use owo_colors::OwoColorize;
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};
use reqwest::Client;
use serde::de::DeserializeOwned;

#[derive(Parser, Debug)]
#[command(
    name = "ecosim-control",
    version,
    about = "Drive a running ecosim server via its REST control surface"
)]
struct Cli {
    /// Base URL for the running ecosim server.
    #[arg(
        long,
        env = "ECOSIM_CONTROL_URL",
        default_value = "http://127.0.0.1:8080"
    )]
    base_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reseed the grid with a fresh random population.
    Start {
        #[arg(long, default_value_t = 20)]
        plants: u32,
        #[arg(long, default_value_t = 10)]
        herbivores: u32,
        #[arg(long, default_value_t = 3)]
        carnivores: u32,
    },
    /// Advance the simulation and print the resulting grid.
    Next {
        /// Number of iterations to run.
        #[arg(long, default_value_t = 1)]
        count: u32,
    },
    /// Show the latest iteration summary.
    Summary,
    /// List recent iteration summaries.
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Launch a live dashboard that advances one iteration per refresh.
    Watch {
        /// Refresh interval in milliseconds.
        #[arg(long, default_value_t = 500)]
        interval_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = Client::builder()
        .build()
        .context("failed to build HTTP client")?;

    match cli.command {
        Command::Start {
            plants,
            herbivores,
            carnivores,
        } => {
            let request = StartRequest {
                plants,
                herbivores,
                carnivores,
            };
            start_command(&client, &cli.base_url, request).await?
        }
        Command::Next { count } => next_command(&client, &cli.base_url, count).await?,
        Command::Summary => summary_command(&client, &cli.base_url).await?,
        Command::History { limit } => history_command(&client, &cli.base_url, limit).await?,
        Command::Watch { interval_ms } => {
            run_watch(
                client.clone(),
                cli.base_url.clone(),
                Duration::from_millis(interval_ms),
            )
            .await?
        }
    }

    Ok(())
}

async fn start_command(client: &Client, base_url: &str, request: StartRequest) -> Result<()> {
    let grid = start_simulation(client, base_url, &request).await?;
    println!("{}", "Simulation started".green().bold());
    print_grid(&grid);
    Ok(())
}

async fn next_command(client: &Client, base_url: &str, count: u32) -> Result<()> {
    if count == 0 {
        bail!("--count must be at least 1");
    }
    let mut grid = None;
    for _ in 0..count {
        grid = Some(next_iteration(client, base_url).await?);
    }
    let summary = fetch_summary(client, base_url).await?;
    print_summary_header();
    print_summary_row(&summary);
    if let Some(grid) = grid {
        print_grid(&grid);
    }
    Ok(())
}

async fn summary_command(client: &Client, base_url: &str) -> Result<()> {
    let summary = fetch_summary(client, base_url).await?;
    print_summary_header();
    print_summary_row(&summary);
    Ok(())
}

async fn history_command(client: &Client, base_url: &str, limit: usize) -> Result<()> {
    let history = fetch_history(client, base_url, limit).await?;
    if history.is_empty() {
        println!("{}", "No iterations have run yet".yellow());
        return Ok(());
    }
    print_summary_header();
    for summary in &history {
        print_summary_row(summary);
    }
    Ok(())
}

fn print_summary_header() {
    println!(
        "{:>6} {:>8} {:>8} {:>6} {:>6} {:>6} {:>6} {:>6}",
        "ITER".bold().cyan(),
        "WORKERS".bold().cyan(),
        "DONE".bold().cyan(),
        "BORN".bold().cyan(),
        "DIED".bold().cyan(),
        "P".bold().green(),
        "H".bold().yellow(),
        "C".bold().red()
    );
    println!("{}", "-".repeat(62).dimmed());
}

fn print_summary_row(summary: &IterationSummary) {
    println!(
        "{:>6} {:>8} {:>8} {:>6} {:>6} {:>6} {:>6} {:>6}",
        summary.iteration.0,
        summary.expected,
        summary.completed,
        summary.births,
        summary.deaths,
        summary.population.plants,
        summary.population.herbivores,
        summary.population.carnivores
    );
}

fn print_grid(grid: &GridSnapshot) {
    for row in grid.rows() {
        let mut line = String::with_capacity(row.len() * 2);
        for cell in row {
            let symbol = cell.kind.symbol().to_string();
            let painted = match cell.kind {
                EntityKind::Plant => symbol.green().to_string(),
                EntityKind::Herbivore => symbol.yellow().bold().to_string(),
                EntityKind::Carnivore => symbol.red().bold().to_string(),
                EntityKind::Empty => ".".dimmed().to_string(),
            };
            line.push_str(&painted);
            line.push(' ');
        }
        println!("{line}");
    }
}

async fn run_watch(client: Client, base_url: String, interval: Duration) -> Result<()> {
    tokio::task::spawn_blocking(move || watch_blocking(client, base_url, interval)).await??;
    Ok(())
}

fn watch_blocking(client: Client, base_url: String, interval: Duration) -> Result<()> {
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, Hide).context("failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal")?;
    let _cleanup = TerminalCleanup;

    let handle = tokio::runtime::Handle::current();
    let mut view = WatchView::default();
    let mut paused = false;
    let mut last_refresh = Instant::now()
        .checked_sub(interval)
        .unwrap_or_else(Instant::now);

    loop {
        if !paused && last_refresh.elapsed() >= interval {
            let step = async {
                let grid = next_iteration(&client, &base_url).await?;
                let summary = fetch_summary(&client, &base_url).await?;
                anyhow::Ok((grid, summary))
            };
            match handle.block_on(step) {
                Ok((grid, summary)) => {
                    view.grid = Some(grid);
                    view.summary = Some(summary);
                    view.error = None;
                }
                Err(err) => {
                    view.error = Some(err.to_string());
                    paused = true;
                }
            }
            last_refresh = Instant::now();
        }

        terminal
            .draw(|frame| draw_watch(frame, &view, paused, interval))
            .context("failed to draw watch UI")?;

        if event::poll(Duration::from_millis(50)).context("failed to poll terminal events")?
            && let Event::Key(key) = event::read().context("failed to read terminal event")?
        {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => break,
                KeyCode::Char('p') | KeyCode::Char(' ') => paused = !paused,
                _ => {}
            }
        }
    }

    terminal.show_cursor().ok();
    Ok(())
}

#[derive(Default)]
struct WatchView {
    grid: Option<GridSnapshot>,
    summary: Option<IterationSummary>,
    error: Option<String>,
}

fn draw_watch(frame: &mut ratatui::Frame, view: &WatchView, paused: bool, interval: Duration) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(5), Constraint::Min(1)])
        .split(frame.area());

    let state = if paused { "paused" } else { "running" };
    let mut header_lines = vec![
        Line::from(vec![
            Span::styled(
                "ecosim ",
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw(format!(
                "{state} every {} ms (q quit, p pause)",
                interval.as_millis()
            )),
        ]),
    ];
    if let Some(summary) = &view.summary {
        header_lines.push(Line::from(format!(
            "iteration {}  workers {}/{}  births {}  deaths {}",
            summary.iteration.0,
            summary.completed,
            summary.expected,
            summary.births,
            summary.deaths
        )));
        header_lines.push(Line::from(vec![
            Span::styled(
                format!("plants {}  ", summary.population.plants),
                Style::default().fg(Color::Green),
            ),
            Span::styled(
                format!("herbivores {}  ", summary.population.herbivores),
                Style::default().fg(Color::Yellow),
            ),
            Span::styled(
                format!("carnivores {}", summary.population.carnivores),
                Style::default().fg(Color::Red),
            ),
        ]));
    }
    if let Some(message) = &view.error {
        header_lines.push(Line::from(Span::styled(
            format!("Last error: {message}"),
            Style::default().fg(Color::Red),
        )));
    }
    let header = Paragraph::new(header_lines).block(Block::default().borders(Borders::ALL));
    frame.render_widget(header, layout[0]);

    let Some(grid) = &view.grid else {
        let empty = Paragraph::new("Waiting for the first iteration...")
            .block(Block::default().borders(Borders::ALL));
        frame.render_widget(empty, layout[1]);
        return;
    };

    let lines: Vec<Line> = grid
        .rows()
        .iter()
        .map(|row| {
            Line::from(
                row.iter()
                    .map(|cell| {
                        let (symbol, style) = match cell.kind {
                            EntityKind::Plant => ("P ", Style::default().fg(Color::Green)),
                            EntityKind::Herbivore => (
                                "H ",
                                Style::default()
                                    .fg(Color::Yellow)
                                    .add_modifier(Modifier::BOLD),
                            ),
                            EntityKind::Carnivore => (
                                "C ",
                                Style::default()
                                    .fg(Color::Red)
                                    .add_modifier(Modifier::BOLD),
                            ),
                            EntityKind::Empty => (". ", Style::default().fg(Color::DarkGray)),
                        };
                        Span::styled(symbol, style)
                    })
                    .collect::<Vec<_>>(),
            )
        })
        .collect();
    let body = Paragraph::new(lines).block(Block::default().borders(Borders::ALL));
    frame.render_widget(body, layout[1]);
}

struct TerminalCleanup;

impl Drop for TerminalCleanup {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let mut stdout = io::stdout();
        let _ = execute!(stdout, LeaveAlternateScreen, Show);
    }
}

async fn start_simulation(
    client: &Client,
    base_url: &str,
    request: &StartRequest,
) -> Result<GridSnapshot> {
    let url = join_url(base_url, "/start-simulation");
    let response = client
        .post(url)
        .json(request)
        .send()
        .await
        .context("failed to start simulation")?;
    parse_response(response).await
}

async fn next_iteration(client: &Client, base_url: &str) -> Result<GridSnapshot> {
    let url = join_url(base_url, "/next-iteration");
    let response = client
        .get(url)
        .send()
        .await
        .context("failed to advance simulation")?;
    parse_response(response).await
}

async fn fetch_summary(client: &Client, base_url: &str) -> Result<IterationSummary> {
    let url = join_url(base_url, "/summary");
    let response = client
        .get(url)
        .send()
        .await
        .context("failed to fetch iteration summary")?;
    parse_response(response).await
}

async fn fetch_history(
    client: &Client,
    base_url: &str,
    limit: usize,
) -> Result<Vec<IterationSummary>> {
    let url = join_url(base_url, &format!("/history?limit={limit}"));
    let response = client
        .get(url)
        .send()
        .await
        .context("failed to fetch iteration history")?;
    parse_response(response).await
}

async fn parse_response<T>(response: reqwest::Response) -> Result<T>
where
    T: DeserializeOwned,
{
    let status = response.status();
    if status.is_success() {
        response
            .json::<T>()
            .await
            .context("failed to deserialize control API response")
    } else {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unavailable>".to_string());
        bail!("control API request failed ({status}): {body}");
    }
}

fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}
