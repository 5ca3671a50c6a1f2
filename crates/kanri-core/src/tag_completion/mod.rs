//! `#tag` recognition while typing.
//!
//! All offsets are char offsets into the
//! text, not byte offsets.

pub mod placement;

use std::sync::Arc;
use std::sync::atomic::{
  AtomicU64,
  Ordering
};
use std::time::Duration;

use kanri_shared::Tag;
use parking_lot::Mutex;
use tracing::{
  debug,
  trace,
  warn
};

use self::placement::{
  InputField,
  PanelPlacement,
  Viewport,
  place_panel
};
use crate::services::TagService;

pub const DEFAULT_BLUR_GRACE: Duration =
  Duration::from_millis(200);
pub const DEFAULT_SUGGESTION_LIMIT: usize = 8;

/// A `#`-prefixed run of non-whitespace.
/// `end` is exclusive; `content` excludes
/// the `#`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagToken {
  pub start:   usize,
  pub end:     usize,
  pub content: String
}

impl TagToken {
  /// Caret positions `start..=end` count
  /// as inside the token.
  pub fn contains(&self, caret: usize) -> bool {
    self.start <= caret && caret <= self.end
  }
}

/// Every token in `text`, left to right.
/// A token starts at the beginning of the
/// text or after whitespace and needs at
/// least one char after the `#`.
pub fn scan_tokens(text: &str) -> Vec<TagToken> {
  let chars: Vec<char> = text.chars().collect();
  let mut tokens = Vec::new();
  let mut i = 0;
  while i < chars.len() {
    let starts_token = chars[i] == '#'
      && (i == 0 || chars[i - 1].is_whitespace());
    if !starts_token {
      i += 1;
      continue;
    }
    let mut end = i + 1;
    while end < chars.len()
      && !chars[end].is_whitespace()
    {
      end += 1;
    }
    if end > i + 1 {
      tokens.push(TagToken {
        start:   i,
        end,
        content: chars[i + 1..end]
          .iter()
          .collect()
      });
    }
    i = end;
  }
  tokens
}

/// The first token whose span holds the
/// caret.
pub fn find_active_token(
  text: &str,
  caret: usize
) -> Option<TagToken> {
  scan_tokens(text)
    .into_iter()
    .find(|token| token.contains(caret))
}

/// Name as stored: every `#` and all
/// whitespace removed.
pub fn clean_tag_name(raw: &str) -> String {
  raw
    .chars()
    .filter(|c| *c != '#' && !c.is_whitespace())
    .collect()
}

/// Name as shown in titles and
/// descriptions: like [`clean_tag_name`],
/// but a leading `#` survives as exactly
/// one `#`.
pub fn clean_display_name(raw: &str) -> String {
  let name = clean_tag_name(raw);
  if !name.is_empty()
    && raw.trim_start().starts_with('#')
  {
    format!("#{name}")
  } else {
    name
  }
}

/// Distinct cleaned tag names in `text`,
/// in order of first appearance.
pub fn extract_tag_names(
  text: &str
) -> Vec<String> {
  let mut names: Vec<String> = Vec::new();
  for token in scan_tokens(text) {
    let name = clean_tag_name(&token.content);
    if !name.is_empty() && !names.contains(&name)
    {
      names.push(name);
    }
  }
  names
}

/// `text` with its tag tokens removed and
/// whitespace collapsed.
pub fn strip_tag_tokens(text: &str) -> String {
  text
    .split_whitespace()
    .filter(|word| {
      !(word.starts_with('#')
        && word.chars().count() > 1)
    })
    .collect::<Vec<_>>()
    .join(" ")
}

/// Passed to the detection callback when
/// a tag is inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagDetected {
  pub tag_name: String,
  pub position: usize
}

/// Replacement text for the input and the
/// caret position to restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
  pub text:  String,
  pub caret: usize
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum Key {
  Escape,
  Up,
  Down,
  Other
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum CompletionState {
  #[default]
  Idle,
  Active {
    token:       TagToken,
    suggestions: Vec<Tag>,
    highlighted: usize,
    placement:   Option<PanelPlacement>
  }
}

type DetectCallback =
  Arc<dyn Fn(TagDetected) + Send + Sync>;

/// Per-input completion state machine.
/// Clones share state, so a clone can run
/// the blur timer.
#[derive(Clone)]
pub struct TagCompletion {
  tags:       TagService,
  state:      Arc<Mutex<CompletionState>>,
  generation: Arc<AtomicU64>,
  on_detect:  Option<DetectCallback>,
  limit:      usize,
  blur_grace: Duration
}

impl std::fmt::Debug for TagCompletion {
  fn fmt(
    &self,
    f: &mut std::fmt::Formatter<'_>
  ) -> std::fmt::Result {
    f.debug_struct("TagCompletion")
      .field("state", &*self.state.lock())
      .field("limit", &self.limit)
      .field("blur_grace", &self.blur_grace)
      .finish_non_exhaustive()
  }
}

impl TagCompletion {
  pub fn new(tags: TagService) -> Self {
    Self {
      tags,
      state: Arc::new(Mutex::new(
        CompletionState::Idle
      )),
      generation: Arc::new(AtomicU64::new(0)),
      on_detect: None,
      limit: DEFAULT_SUGGESTION_LIMIT,
      blur_grace: DEFAULT_BLUR_GRACE
    }
  }

  pub fn on_detect(
    mut self,
    callback: impl Fn(TagDetected)
      + Send
      + Sync
      + 'static
  ) -> Self {
    self.on_detect = Some(Arc::new(callback));
    self
  }

  pub fn with_limit(
    mut self,
    limit: usize
  ) -> Self {
    self.limit = limit;
    self
  }

  pub fn with_blur_grace(
    mut self,
    grace: Duration
  ) -> Self {
    self.blur_grace = grace;
    self
  }

  pub fn state(&self) -> CompletionState {
    self.state.lock().clone()
  }

  pub fn is_active(&self) -> bool {
    matches!(
      *self.state.lock(),
      CompletionState::Active { .. }
    )
  }

  pub fn active_token(&self) -> Option<TagToken> {
    match &*self.state.lock() {
      | CompletionState::Active {
        token, ..
      } => Some(token.clone()),
      | CompletionState::Idle => None
    }
  }

  pub fn suggestions(&self) -> Vec<Tag> {
    match &*self.state.lock() {
      | CompletionState::Active {
        suggestions,
        ..
      } => suggestions.clone(),
      | CompletionState::Idle => vec![]
    }
  }

  pub fn highlighted(&self) -> Option<Tag> {
    match &*self.state.lock() {
      | CompletionState::Active {
        suggestions,
        highlighted,
        ..
      } => suggestions.get(*highlighted).cloned(),
      | CompletionState::Idle => None
    }
  }

  fn hide(&self) {
    let mut state = self.state.lock();
    if *state != CompletionState::Idle {
      trace!("hiding tag suggestions");
    }
    *state = CompletionState::Idle;
  }

  /// Runs on every input or keyup. Any
  /// pending blur hide is cancelled.
  pub fn check_for_tag_input(
    &self,
    text: &str,
    caret: usize
  ) -> Option<TagToken> {
    self.generation.fetch_add(1, Ordering::SeqCst);
    let Some(token) =
      find_active_token(text, caret)
    else {
      self.hide();
      return None;
    };

    let suggestions = self
      .tags
      .search_tags(&token.content, Some(self.limit));
    debug!(
      start = token.start,
      end = token.end,
      query = %token.content,
      matches = suggestions.len(),
      "tag token active"
    );
    *self.state.lock() = CompletionState::Active {
      token: token.clone(),
      suggestions,
      highlighted: 0,
      placement: None
    };
    Some(token)
  }

  /// Positions the panel for the active
  /// token.
  pub fn place(
    &self,
    field: &InputField,
    text: &str,
    viewport: Viewport
  ) -> Option<PanelPlacement> {
    let mut state = self.state.lock();
    let CompletionState::Active {
      token,
      placement,
      ..
    } = &mut *state
    else {
      return None;
    };
    let placed = place_panel(
      field,
      text,
      token.start,
      viewport
    );
    *placement = Some(placed);
    Some(placed)
  }

  /// Returns true when the key was used.
  pub fn on_key(&self, key: Key) -> bool {
    let mut state = self.state.lock();
    if *state == CompletionState::Idle {
      return false;
    }
    if key == Key::Escape {
      *state = CompletionState::Idle;
      return true;
    }
    let CompletionState::Active {
      suggestions,
      highlighted,
      ..
    } = &mut *state
    else {
      return false;
    };
    match key {
      | Key::Down if !suggestions.is_empty() => {
        *highlighted =
          (*highlighted + 1) % suggestions.len();
        true
      }
      | Key::Up if !suggestions.is_empty() => {
        *highlighted = highlighted
          .checked_sub(1)
          .unwrap_or(suggestions.len() - 1);
        true
      }
      | _ => false
    }
  }

  /// Hides the panel once the grace
  /// period passes, unless the input was
  /// touched again in the meantime.
  pub async fn on_blur(&self) {
    let generation = self
      .generation
      .fetch_add(1, Ordering::SeqCst)
      + 1;
    tokio::time::sleep(self.blur_grace).await;
    if self.generation.load(Ordering::SeqCst)
      == generation
    {
      self.hide();
    } else {
      trace!("blur hide superseded");
    }
  }

  /// Replaces the active token with
  /// `#<name> ` and moves the caret past
  /// it.
  pub fn select_suggestion(
    &self,
    text: &str,
    tag: &Tag
  ) -> Option<TextEdit> {
    let token = self.active_token()?;
    let edit =
      replace_token(text, &token, &tag.name);
    self.generation.fetch_add(1, Ordering::SeqCst);
    self.hide();
    if let Some(callback) = &self.on_detect {
      callback(TagDetected {
        tag_name: tag.name.clone(),
        position: token.start
      });
    }
    Some(edit)
  }

  /// Turns the active token into a tag,
  /// creating it if no tag has that name.
  pub async fn create_new_tag(
    &self,
    text: &str
  ) -> Option<TextEdit> {
    let token = self.active_token()?;
    let name = clean_tag_name(&token.content);
    if name.is_empty() {
      warn!("token has no usable tag name");
      return None;
    }
    let tag = self
      .tags
      .get_or_create_tag(&name, None)
      .await?;
    self.select_suggestion(text, &tag)
  }
}

/// `before + "#name " + after`. One space
/// right after the token is absorbed by the
/// inserted one; other whitespace stays.
pub fn replace_token(
  text: &str,
  token: &TagToken,
  name: &str
) -> TextEdit {
  let before: String =
    text.chars().take(token.start).collect();
  let mut rest =
    text.chars().skip(token.end).peekable();
  rest.next_if_eq(&' ');
  let after: String = rest.collect();
  let inserted = format!("#{name} ");
  let caret = before.chars().count()
    + inserted.chars().count();
  TextEdit {
    text: format!("{before}{inserted}{after}"),
    caret
  }
}
