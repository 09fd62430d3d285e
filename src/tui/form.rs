//! Submission form state and rendering.
//!
//! Numeric validation lives at this widget layer; the controller only ever
//! sees a well-formed `ProcessRequest`.

use crate::cli::Cli;
use crate::model::ProcessRequest;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Style};
use ratatui::widgets::{Block, Borders, Paragraph};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    VideoIds,
    NumVideos,
    NumComments,
    NumTags,
    ClusteringStrength,
}

const FOCUS_ORDER: [Focus; 5] = [
    Focus::VideoIds,
    Focus::NumVideos,
    Focus::NumComments,
    Focus::NumTags,
    Focus::ClusteringStrength,
];

pub struct FormState {
    pub video_ids: String,
    pub num_videos: String,
    pub num_comments: String,
    pub num_tags: String,
    pub clustering_strength: String,
    pub focus: Focus,
}

impl FormState {
    pub fn from_args(args: &Cli) -> Self {
        Self {
            video_ids: args.video_ids.join("\n"),
            num_videos: args.num_videos.to_string(),
            num_comments: args.num_comments.to_string(),
            num_tags: args.num_tags.to_string(),
            clustering_strength: args.clustering_strength.to_string(),
            focus: Focus::VideoIds,
        }
    }

    pub fn focus_next(&mut self) {
        let i = FOCUS_ORDER.iter().position(|f| *f == self.focus).unwrap_or(0);
        self.focus = FOCUS_ORDER[(i + 1) % FOCUS_ORDER.len()];
    }

    pub fn focus_prev(&mut self) {
        let i = FOCUS_ORDER.iter().position(|f| *f == self.focus).unwrap_or(0);
        self.focus = FOCUS_ORDER[(i + FOCUS_ORDER.len() - 1) % FOCUS_ORDER.len()];
    }

    fn focused_buffer(&mut self) -> &mut String {
        match self.focus {
            Focus::VideoIds => &mut self.video_ids,
            Focus::NumVideos => &mut self.num_videos,
            Focus::NumComments => &mut self.num_comments,
            Focus::NumTags => &mut self.num_tags,
            Focus::ClusteringStrength => &mut self.clustering_strength,
        }
    }

    pub fn insert_char(&mut self, c: char) {
        if c.is_control() {
            return;
        }
        self.focused_buffer().push(c);
    }

    pub fn backspace(&mut self) {
        self.focused_buffer().pop();
    }

    /// Enter adds a line in the IDs field; elsewhere it means "submit".
    pub fn newline(&mut self) -> bool {
        if self.focus == Focus::VideoIds {
            self.video_ids.push('\n');
            true
        } else {
            false
        }
    }

    /// Widget-layer validation. Errors are user-facing strings shown in the
    /// status line; a valid form yields the request to submit.
    pub fn validate(&self) -> Result<ProcessRequest, String> {
        let video_ids: Vec<String> = self
            .video_ids
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        if video_ids.is_empty() {
            return Err("enter at least one video ID".into());
        }

        let num_videos = parse_count(&self.num_videos, "number of videos")?;
        let num_comments = parse_count(&self.num_comments, "number of comments")?;
        let num_tags = parse_count(&self.num_tags, "number of tags")?;

        let clustering_strength: f64 = self
            .clustering_strength
            .trim()
            .parse()
            .map_err(|_| "clustering strength must be a number".to_string())?;
        if !(0.0..=1.0).contains(&clustering_strength) {
            return Err("clustering strength must be between 0.0 and 1.0".into());
        }

        Ok(ProcessRequest {
            video_ids,
            num_videos,
            num_comments,
            num_tags,
            clustering_strength,
        })
    }
}

fn parse_count(buf: &str, label: &str) -> Result<u32, String> {
    let n: u32 = buf
        .trim()
        .parse()
        .map_err(|_| format!("{label} must be a whole number"))?;
    if n == 0 {
        return Err(format!("{label} must be at least 1"));
    }
    Ok(n)
}

fn field_style(focused: bool) -> Style {
    if focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    }
}

pub fn render(f: &mut ratatui::Frame, area: Rect, form: &FormState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(6), Constraint::Length(3)].as_ref())
        .split(area);

    let ids = Paragraph::new(form.video_ids.as_str()).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Video IDs (one per line)")
            .border_style(field_style(form.focus == Focus::VideoIds)),
    );
    f.render_widget(ids, rows[0]);

    let numeric = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(
            [
                Constraint::Percentage(25),
                Constraint::Percentage(25),
                Constraint::Percentage(25),
                Constraint::Percentage(25),
            ]
            .as_ref(),
        )
        .split(rows[1]);

    let cells = [
        ("Videos", &form.num_videos, Focus::NumVideos),
        ("Comments", &form.num_comments, Focus::NumComments),
        ("Tags", &form.num_tags, Focus::NumTags),
        ("Clustering", &form.clustering_strength, Focus::ClusteringStrength),
    ];
    for (i, (title, value, focus)) in cells.into_iter().enumerate() {
        let cell = Paragraph::new(value.as_str()).block(
            Block::default()
                .borders(Borders::ALL)
                .title(title)
                .border_style(field_style(form.focus == focus)),
        );
        f.render_widget(cell, numeric[i]);
    }
}
