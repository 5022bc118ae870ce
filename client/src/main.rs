use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal,
    backend::{Backend, CrosstermBackend},
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Gauge, Paragraph},
};
use shared::{Command, Response, RgbSnapshot, SOCKET_PATH, Status};
use std::{
    error::Error,
    io,
    time::{Duration, Instant},
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

const RGB_MODES: u8 = 4;
const RGB_SPEEDS: u8 = 3;
const FAN_MODES: u8 = 3;

const COLOUR_PRESETS: [(&str, [u8; 3]); 4] = [
    ("White", [0xff, 0xff, 0xff]),
    ("Red", [0xff, 0x00, 0x00]),
    ("Teal", [0x00, 0xc8, 0xb4]),
    ("Amber", [0xff, 0x8c, 0x00]),
];

struct App {
    last_response: String,
    status: Option<Status>,
    /// Local copy of what has been staged since the last commit.
    staged: Option<RgbSnapshot>,
}

fn fan_mode_label(mode: u8) -> &'static str {
    match mode {
        0 => "Normal",
        1 => "Turbo",
        2 => "Silent",
        _ => "Unknown",
    }
}

fn rgb_mode_label(mode: u8) -> &'static str {
    match mode {
        1 => "Blink",
        2 => "Rainbow",
        3 => "Strobe",
        _ => "Static",
    }
}

fn speed_label(speed: u8) -> &'static str {
    match speed {
        1 => "Medium",
        2 => "Fast",
        _ => "Slow",
    }
}

fn bool_label(value: bool) -> &'static str {
    if value { "Handled" } else { "Passed through" }
}

fn backlight_percent(level: u8, max: u8) -> u8 {
    if max == 0 {
        return 0;
    }
    (u16::from(level.min(max)) * 100 / u16::from(max)) as u8
}

fn get_backlight_color(level: u8) -> Color {
    match level {
        0 => Color::DarkGray,
        1 => Color::Yellow,
        2 => Color::LightYellow,
        _ => Color::White,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App {
        last_response: "Connecting to daemon...".to_string(),
        status: None,
        staged: None,
    };
    sync_status(&mut app).await;

    let run_result = run_app(&mut terminal, &mut app).await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = run_result {
        println!("{err:?}");
    }

    Ok(())
}

async fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()> {
    let draw_tick = Duration::from_millis(120);
    let poll_tick = Duration::from_millis(900);
    let mut last_draw_tick = Instant::now();
    let mut last_poll_tick = Instant::now();

    loop {
        terminal.draw(|frame| {
            let root = Layout::default()
                .direction(Direction::Vertical)
                .margin(1)
                .constraints([
                    Constraint::Length(3),
                    Constraint::Min(16),
                    Constraint::Length(3),
                ])
                .split(frame.size());

            let body = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
                .split(root[1]);

            draw_header(frame, root[0]);
            draw_device_state(frame, body[0], app);
            draw_controls(frame, body[1], app);
            draw_footer(frame, root[2], app);
        })?;

        let timeout = draw_tick
            .checked_sub(last_draw_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if event::poll(timeout)?
            && let Event::Key(key) = event::read()?
        {
            match key.code {
                KeyCode::Char('q') => return Ok(()),
                KeyCode::Char('+') | KeyCode::Char('=') => step_brightness(app, 1).await,
                KeyCode::Char('-') => step_brightness(app, -1).await,
                KeyCode::Char('f') => {
                    let next = app
                        .status
                        .as_ref()
                        .and_then(|status| status.fan_mode)
                        .map_or(0, |mode| (mode + 1) % FAN_MODES);
                    app.last_response = write_attribute("fan_mode", next).await;
                }
                KeyCode::Char('m') => {
                    if let Some(staged) = staged(app) {
                        staged.mode = (staged.mode + 1) % RGB_MODES;
                        let mode = staged.mode;
                        app.last_response = write_attribute("kbbl_mode", mode).await;
                    }
                }
                KeyCode::Char('s') => {
                    if let Some(staged) = staged(app) {
                        staged.speed = (staged.speed + 1) % RGB_SPEEDS;
                        let speed = staged.speed;
                        app.last_response = write_attribute("kbbl_speed", speed).await;
                    }
                }
                KeyCode::Char(c @ '1'..='4') => {
                    let (name, [red, green, blue]) = COLOUR_PRESETS[(c as u8 - b'1') as usize];
                    if let Some(staged) = staged(app) {
                        staged.red = red;
                        staged.green = green;
                        staged.blue = blue;
                        for (attribute, value) in
                            [("kbbl_red", red), ("kbbl_green", green), ("kbbl_blue", blue)]
                        {
                            app.last_response = write_attribute(attribute, value).await;
                        }
                        app.last_response = format!("{} (staged {name})", app.last_response);
                    }
                }
                KeyCode::Char('c') => commit(app, 1).await,
                KeyCode::Char('t') => commit(app, 2).await,
                _ => {}
            }
        }

        if last_poll_tick.elapsed() >= poll_tick {
            sync_status(app).await;
            last_poll_tick = Instant::now();
        }

        if last_draw_tick.elapsed() >= draw_tick {
            last_draw_tick = Instant::now();
        }
    }
}

/// Staged copy, seeded from the committed configuration on first use.
fn staged(app: &mut App) -> Option<&mut RgbSnapshot> {
    if app.staged.is_none() {
        app.staged = app.status.as_ref().and_then(|status| status.rgb);
    }
    if app.staged.is_none() {
        app.last_response = "✗ RGB keyboard unavailable".to_string();
    }
    app.staged.as_mut()
}

async fn step_brightness(app: &mut App, delta: i8) {
    let Some(status) = &app.status else {
        app.last_response = "✗ Not connected".to_string();
        return;
    };
    let Some(level) = status.backlight else {
        app.last_response = "✗ Keyboard backlight unavailable".to_string();
        return;
    };
    let next = level.saturating_add_signed(delta).min(status.max_brightness);
    app.last_response = send_command(Command::SetBrightness(next)).await;
    sync_status(app).await;
}

async fn commit(app: &mut App, value: u8) {
    app.last_response = write_attribute("kbbl_set", value).await;
    app.staged = None;
    sync_status(app).await;
}

fn draw_header(frame: &mut ratatui::Frame<'_>, area: Rect) {
    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            " TUF-SENSE ",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" | "),
        Span::styled("Keyboard & Fan Control", Style::default().fg(Color::Gray)),
    ]))
    .alignment(Alignment::Center)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded),
    );

    frame.render_widget(header, area);
}

fn draw_device_state(frame: &mut ratatui::Frame<'_>, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(10)])
        .split(area);

    let (percent, label, color) = match app.status.as_ref() {
        Some(Status {
            backlight: Some(level),
            max_brightness,
            ..
        }) => (
            backlight_percent(*level, *max_brightness),
            format!("{level}/{max_brightness}"),
            get_backlight_color(*level),
        ),
        _ => (0, "unavailable".to_string(), Color::DarkGray),
    };
    render_gauge(frame, chunks[0], " Keyboard Backlight ", percent, label, color);

    let mut lines = Vec::new();
    match app.status.as_ref() {
        None => lines.push(Line::from(Span::styled(
            "Daemon not reachable",
            Style::default().fg(Color::Red),
        ))),
        Some(status) => {
            lines.push(field(
                "Fan Mode: ",
                status.fan_mode.map_or("Unavailable", fan_mode_label),
                Color::Green,
            ));
            match status.rgb {
                Some(rgb) => {
                    lines.push(Line::from(vec![
                        Span::styled("Colour: ", Style::default().fg(Color::Gray)),
                        Span::styled(
                            format!("#{:02x}{:02x}{:02x} ■", rgb.red, rgb.green, rgb.blue),
                            Style::default().fg(Color::Rgb(rgb.red, rgb.green, rgb.blue)),
                        ),
                    ]));
                    lines.push(field("RGB Mode: ", rgb_mode_label(rgb.mode), Color::Cyan));
                    lines.push(field("Speed: ", speed_label(rgb.speed), Color::Magenta));
                    lines.push(field("Flags: ", &format!("{:02x}", rgb.flags), Color::White));
                }
                None => lines.push(field("RGB: ", "Unavailable", Color::DarkGray)),
            }
            if let Some(staged) = app.staged.filter(|staged| Some(*staged) != status.rgb) {
                lines.push(Line::from(Span::styled(
                    format!(
                        "Pending: #{:02x}{:02x}{:02x} {} {}",
                        staged.red,
                        staged.green,
                        staged.blue,
                        rgb_mode_label(staged.mode),
                        speed_label(staged.speed)
                    ),
                    Style::default().fg(Color::Yellow),
                )));
            }
            lines.push(Line::from(""));
            lines.push(field(
                "Last Key: ",
                status.last_key.as_deref().unwrap_or("-"),
                Color::White,
            ));
            lines.push(field("Fan Key: ", bool_label(status.handle_fan), Color::White));
            lines.push(field(
                "Backlight Keys: ",
                bool_label(status.handle_backlight_keys),
                Color::White,
            ));
        }
    }

    let state = Paragraph::new(lines)
        .block(
            Block::default()
                .title(" Live Device State ")
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded),
        )
        .alignment(Alignment::Left);
    frame.render_widget(state, chunks[1]);
}

fn field<'a>(name: &'a str, value: &str, color: Color) -> Line<'a> {
    Line::from(vec![
        Span::styled(name, Style::default().fg(Color::Gray)),
        Span::styled(value.to_string(), Style::default().fg(color)),
    ])
}

fn draw_controls(frame: &mut ratatui::Frame<'_>, area: Rect, _app: &App) {
    let controls = Paragraph::new(vec![
        Line::from(Span::styled(
            "Backlight / Fan",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(" [+/-] Backlight level"),
        Line::from(" [f] Next fan mode"),
        Line::from(""),
        Line::from(Span::styled(
            "RGB Keyboard (staged until commit)",
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(" [1] White  [2] Red  [3] Teal  [4] Amber"),
        Line::from(" [m] Next mode  [s] Next speed"),
        Line::from(" [c] Commit  [t] Commit until reboot"),
        Line::from(""),
        Line::from(" [q] Quit"),
    ])
    .block(
        Block::default()
            .title(" Controls ")
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded),
    );

    frame.render_widget(controls, area);
}

fn draw_footer(frame: &mut ratatui::Frame<'_>, area: Rect, app: &App) {
    let footer = Paragraph::new(app.last_response.clone())
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .title(" Daemon ")
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded),
        );

    frame.render_widget(footer, area);
}

fn render_gauge(
    frame: &mut ratatui::Frame<'_>,
    area: Rect,
    title: &'static str,
    percent: u8,
    label: String,
    color: Color,
) {
    let gauge = Gauge::default()
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded),
        )
        .gauge_style(Style::default().fg(color).bg(Color::Black))
        .percent(percent.min(100) as u16)
        .label(label);

    frame.render_widget(gauge, area);
}

async fn sync_status(app: &mut App) {
    match request(Command::GetStatus).await {
        Some(Response::Status(status)) => app.status = Some(status),
        _ => app.status = None,
    }
}

async fn write_attribute(name: &str, value: u8) -> String {
    send_command(Command::WriteAttribute {
        name: name.to_string(),
        value: format!("{value:02x}"),
    })
    .await
}

async fn send_command(command: Command) -> String {
    match request(command).await {
        Some(Response::Ack(message)) => format!("✓ {message}"),
        Some(Response::Error(err)) => format!("✗ {err}"),
        Some(Response::Value(value)) => value.trim().to_string(),
        Some(Response::Status(_) | Response::Attributes(_)) => "Status synced".to_string(),
        None => "Unable to communicate with daemon".to_string(),
    }
}

async fn request(command: Command) -> Option<Response> {
    let mut stream = UnixStream::connect(SOCKET_PATH).await.ok()?;
    let message = serde_json::to_vec(&command).ok()?;

    if stream.write_all(&message).await.is_err() {
        return None;
    }

    let mut buffer = Vec::new();
    stream.read_to_end(&mut buffer).await.ok()?;
    if buffer.is_empty() {
        return None;
    }

    serde_json::from_slice(&buffer).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backlight_gauge_scale() {
        assert_eq!(backlight_percent(0, 3), 0);
        assert_eq!(backlight_percent(2, 3), 66);
        assert_eq!(backlight_percent(3, 3), 100);
        assert_eq!(backlight_percent(5, 3), 100);
        assert_eq!(backlight_percent(1, 0), 0);
    }

    #[test]
    fn labels_follow_firmware_tables() {
        assert_eq!(fan_mode_label(2), "Silent");
        assert_eq!(rgb_mode_label(3), "Strobe");
        assert_eq!(rgb_mode_label(9), "Static");
        assert_eq!(speed_label(7), "Slow");
    }

    #[test]
    fn staged_copy_seeds_from_status() {
        let rgb = RgbSnapshot {
            red: 1,
            green: 2,
            blue: 3,
            mode: 0,
            speed: 0,
            flags: 0xff,
        };
        let mut app = App {
            last_response: String::new(),
            status: Some(Status {
                backlight: Some(3),
                max_brightness: 3,
                fan_mode: Some(0),
                rgb: Some(rgb),
                last_key: None,
                handle_fan: true,
                handle_backlight_keys: false,
            }),
            staged: None,
        };
        staged(&mut app).unwrap().mode = 2;
        assert_eq!(app.staged.unwrap().mode, 2);
        assert_eq!(app.status.unwrap().rgb, Some(rgb));
    }
}
