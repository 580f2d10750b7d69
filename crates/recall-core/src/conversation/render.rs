//! ============================================================================
//! Conversation Render - Reply text and keyboards
//! ============================================================================
//! Every reply is HTML; user content always goes through `escape`.
//! ============================================================================

use crate::memory::{Memory, MemoryDraft, SearchHit, Stats};

use super::input::{Signal, NO_TAGS_SENTINEL};
use super::reply::{InlineButton, Reply};
use super::state::Mode;

/// Solution characters shown in the draft preview
pub const PREVIEW_CHARS: usize = 300;
/// Solution characters shown per search hit
pub const RESULT_PREVIEW_CHARS: usize = 150;
/// Memories listed by the recent command
pub const RECENT_LIMIT: usize = 10;
/// Memories listed by a tag search
pub const TAG_RESULTS_LIMIT: usize = 20;
/// Tags suggested when a tag search starts
pub const TAG_HINT_COUNT: usize = 5;
/// Hits returned by a query
pub const SEARCH_LIMIT: usize = 5;
/// Longest message Telegram accepts, in UTF-16 code units
pub const MESSAGE_LIMIT: usize = 4096;
/// Title or tag-list characters in a single-memory reply
const FIELD_CHARS: usize = 200;
/// Title or tag-list characters per list entry
const LIST_FIELD_CHARS: usize = 80;

const SHORT_DATE: &str = "%d/%m/%y";
const FULL_DATE: &str = "%d/%m/%Y %H:%M";

/// Escape text for HTML parse mode
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Cut `text` to `max` characters, marking the cut with "..."
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max).collect();
    cut.push_str("...");
    cut
}

/// Escaped text, cut to `max` characters first
fn field(text: &str, max: usize) -> String {
    escape(&truncate(text, max))
}

fn tag_list(tags: &[String], empty: &str, max: usize) -> String {
    if tags.is_empty() {
        empty.to_string()
    } else {
        field(&tags.join(", "), max)
    }
}

fn utf16_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Escape `text` so the result takes at most `budget` UTF-16 units,
/// cutting between characters and marking the cut with "..."
fn escape_within(text: &str, budget: usize) -> String {
    let full = escape(text);
    if utf16_len(&full) <= budget {
        return full;
    }
    if budget < 3 {
        return String::new();
    }

    let budget = budget - 3;
    let mut out = String::new();
    let mut used = 0;
    let mut buf = [0u8; 4];
    for c in text.chars() {
        let piece = escape(c.encode_utf8(&mut buf));
        let len = utf16_len(&piece);
        if used + len > budget {
            break;
        }
        out.push_str(&piece);
        used += len;
    }
    out.push_str("...");
    out
}

/// Split `total` across `needs`, smallest first, so short sections stay
/// whole and long ones share what is left evenly
fn share(total: usize, needs: &[usize]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..needs.len()).collect();
    order.sort_by_key(|&i| needs[i]);

    let mut left = total;
    let mut budgets = vec![0; needs.len()];
    for (k, &i) in order.iter().enumerate() {
        let fair = left / (needs.len() - k);
        budgets[i] = needs[i].min(fair);
        left -= budgets[i];
    }
    budgets
}

pub fn welcome() -> Reply {
    Reply::new(
        "👋 <b>Hi! I'm your memory agent.</b>\n\n\
         Save solutions as you find them and ask for them later in plain words.\n\n\
         Pick an option from the menu below.",
    )
    .main_menu()
}

pub fn help() -> Reply {
    Reply::new(
        "❓ <b>How it works</b>\n\n\
         ➕ <b>Save solution</b> - paste a solution, then give it a title and tags\n\
         🔎 <b>Ask memory</b> - describe the problem, I'll find the closest memories\n\
         📚 <b>Recent memories</b> - the last 10 saved\n\
         🏷️ <b>Search by tag</b> - every memory carrying one tag\n\
         📊 <b>Stats</b> - totals and popular tags\n\
         ❌ <b>Cancel</b> - abandon whatever is in progress",
    )
    .main_menu()
}

pub fn private_bot() -> Reply {
    Reply::new("🔒 Sorry, this bot is private.")
}

pub fn cancelled() -> Reply {
    Reply::new("❌ Cancelled.").main_menu()
}

pub fn menu_prompt() -> Reply {
    Reply::new("🤔 Please pick an option from the menu.").main_menu()
}

pub fn nothing_pending() -> Reply {
    Reply::new("⌛ That action is no longer pending.")
}

pub fn storage_unavailable() -> Reply {
    Reply::new("⚠️ Storage is unavailable right now, please try again later.").main_menu()
}

pub fn ask_solution() -> Reply {
    Reply::new("📝 Send the solution text (code, commands, notes...).").cancel_menu()
}

pub fn ask_title() -> Reply {
    Reply::new("📌 Give it a short title.").cancel_menu()
}

pub fn ask_tags() -> Reply {
    Reply::new(format!(
        "🏷️ Add tags separated by commas (e.g. <code>mongo, redis</code>), or <code>{}</code> for none.",
        NO_TAGS_SENTINEL
    ))
    .cancel_menu()
}

pub fn ask_query() -> Reply {
    Reply::new("🔎 What are you looking for? Describe the problem.").cancel_menu()
}

pub fn searching() -> Reply {
    Reply::new("🔍 Searching...")
}

/// Prompt repeated after blank input
pub fn reprompt(mode: Mode) -> Reply {
    match mode {
        Mode::SaveWaitText => ask_solution(),
        Mode::SaveWaitTitle => ask_title(),
        Mode::SaveWaitTags => ask_tags(),
        Mode::QueryWaitText => ask_query(),
        Mode::TagSearchWait => Reply::new("🏷️ Type one tag to search for.").cancel_menu(),
        Mode::None | Mode::SaveConfirm | Mode::DeleteConfirm => menu_prompt(),
    }
}

pub fn draft_preview(draft: &MemoryDraft) -> Reply {
    let solution = draft.solution.as_deref().unwrap_or_default();
    let text = format!(
        "👀 <b>Preview</b>\n\n\
         📌 <b>Title:</b> {}\n\
         🏷️ <b>Tags:</b> {}\n\n\
         📝 <b>Content:</b>\n{}\n\n\
         Save it?",
        field(draft.display_title(), FIELD_CHARS),
        tag_list(&draft.tags, "(none)", FIELD_CHARS),
        escape(&truncate(solution, PREVIEW_CHARS)),
    );

    Reply::new(text).inline(vec![
        vec![
            InlineButton::new("✅ Save", Signal::ConfirmSave),
            InlineButton::new("❌ Cancel", Signal::CancelSave),
        ],
        vec![
            InlineButton::new("✏️ Edit title", Signal::EditTitle),
            InlineButton::new("🏷️ Edit tags", Signal::EditTags),
        ],
    ])
}

pub fn saved(memory: &Memory) -> Reply {
    Reply::new(format!(
        "✅ <b>Saved!</b>\n\n📌 {}\n🏷️ {}\n\n🔑 ID: <code>{}</code>",
        field(&memory.title, FIELD_CHARS),
        tag_list(&memory.tags, "(no tags)", FIELD_CHARS),
        escape(&memory.id),
    ))
    .editing()
}

pub fn no_draft() -> Reply {
    Reply::new("❌ There is no draft to save.").editing()
}

pub fn save_cancelled() -> Reply {
    Reply::new("❌ Save cancelled.").editing()
}

pub fn edit_title() -> Reply {
    Reply::new("✏️ Send the new title.").editing()
}

pub fn edit_tags() -> Reply {
    Reply::new("🏷️ Send the new tags, separated by commas.").editing()
}

fn hit_preview(index: usize, hit: &SearchHit) -> String {
    let score = hit
        .score
        .map(|s| format!(" ({:.0}% match)", s * 100.0))
        .unwrap_or_default();

    format!(
        "<b>{}) {}</b>{}\n🏷️ {}\n📝 {}\n",
        index,
        field(&hit.memory.title, LIST_FIELD_CHARS),
        score,
        tag_list(&hit.memory.tags, "-", LIST_FIELD_CHARS),
        escape(&truncate(&hit.memory.solution, RESULT_PREVIEW_CHARS)),
    )
}

pub fn search_results(hits: &[SearchHit]) -> Reply {
    if hits.is_empty() {
        return Reply::new("😕 I couldn't find anything relevant.").main_menu();
    }

    let mut lines = vec![format!("🧠 <b>Found {} relevant memories:</b>\n", hits.len())];
    let mut rows = Vec::with_capacity(hits.len());

    for (i, hit) in hits.iter().enumerate() {
        let n = i + 1;
        lines.push(hit_preview(n, hit));
        rows.push(vec![
            InlineButton::new(format!("📖 View {}", n), Signal::View(hit.memory.id.clone())),
            InlineButton::new(format!("🗑️ Delete {}", n), Signal::Delete(hit.memory.id.clone())),
        ]);
    }

    Reply::new(lines.join("\n")).inline(rows)
}

pub fn recent_list(memories: &[Memory]) -> Reply {
    if memories.is_empty() {
        return Reply::new("📭 No memories saved yet.").main_menu();
    }

    let mut lines = vec![format!("📚 <b>Last {} memories:</b>\n", memories.len())];
    for (i, memory) in memories.iter().enumerate() {
        lines.push(format!(
            "{}. <b>{}</b>\n   🏷️ {} | 📅 {}\n",
            i + 1,
            field(&memory.title, LIST_FIELD_CHARS),
            tag_list(&memory.tags, "-", LIST_FIELD_CHARS),
            memory.created_at.format(SHORT_DATE),
        ));
    }

    Reply::new(lines.join("\n")).main_menu()
}

pub fn tag_hint(stats: &Stats) -> Reply {
    let mut text = String::from("🏷️ Type one tag to search for.");
    if !stats.top_tags.is_empty() {
        let popular: Vec<String> = stats
            .top_tags
            .iter()
            .take(TAG_HINT_COUNT)
            .map(|t| format!("<code>{}</code>", escape(&t.tag)))
            .collect();
        text.push_str(&format!("\n\n📊 Popular tags: {}", popular.join(", ")));
    }
    Reply::new(text).cancel_menu()
}

pub fn tag_results(tag: &str, memories: &[Memory]) -> Reply {
    if memories.is_empty() {
        return Reply::new(format!(
            "😕 No memories tagged <code>{}</code>.",
            escape(tag)
        ))
        .main_menu();
    }

    let mut lines = vec![format!("🏷️ <b>Memories tagged <code>{}</code>:</b>\n", escape(tag))];
    for (i, memory) in memories.iter().enumerate() {
        lines.push(format!(
            "{}. {} | 📅 {}",
            i + 1,
            field(&memory.title, LIST_FIELD_CHARS),
            memory.created_at.format(SHORT_DATE),
        ));
    }

    Reply::new(lines.join("\n")).main_menu()
}

pub fn stats(stats: &Stats) -> Reply {
    let mut text = format!("📊 <b>Stats</b>\n\n📝 Total memories: <b>{}</b>", stats.total);
    if !stats.top_tags.is_empty() {
        text.push_str("\n\n🏷️ Popular tags:");
        for tag in &stats.top_tags {
            text.push_str(&format!("\n  • {}: {}", escape(&tag.tag), tag.count));
        }
    }
    Reply::new(text).main_menu()
}

/// Full memory with its code block, if any. Long bodies are cut so the
/// whole message fits in `MESSAGE_LIMIT`.
pub fn memory_view(memory: &Memory) -> Reply {
    let header = format!(
        "📌 <b>{}</b>\n\n🏷️ Tags: {}\n📅 Created: {}\n\n",
        field(&memory.title, FIELD_CHARS),
        tag_list(&memory.tags, "-", FIELD_CHARS),
        memory.created_at.format(FULL_DATE),
    );

    // (opening, body, closing)
    let mut sections = vec![("📝 <b>Solution:</b>\n", memory.solution.as_str(), "\n")];
    if !memory.context.trim().is_empty() {
        sections.push(("\n📎 <b>Context:</b>\n", memory.context.as_str(), "\n"));
    }
    if !memory.code.trim().is_empty() {
        sections.push(("\n💻 <b>Code:</b>\n<pre>", memory.code.as_str(), "</pre>"));
    }

    let fixed = utf16_len(&header)
        + sections
            .iter()
            .map(|(open, _, close)| utf16_len(open) + utf16_len(close))
            .sum::<usize>();
    let needs: Vec<usize> = sections
        .iter()
        .map(|(_, body, _)| utf16_len(&escape(body)))
        .collect();
    let budgets = share(MESSAGE_LIMIT.saturating_sub(fixed), &needs);

    let mut text = header;
    for ((open, body, close), budget) in sections.iter().zip(budgets) {
        text.push_str(open);
        text.push_str(&escape_within(body, budget));
        text.push_str(close);
    }

    Reply::new(text).inline(vec![vec![InlineButton::new(
        "🗑️ Delete",
        Signal::Delete(memory.id.clone()),
    )]])
}

pub fn delete_confirmation(memory: &Memory) -> Reply {
    Reply::new(format!(
        "⚠️ <b>Delete this memory?</b>\n\n📌 {}\n\nThis cannot be undone!",
        field(&memory.title, FIELD_CHARS)
    ))
    .inline(vec![vec![
        InlineButton::new("🗑️ Yes, delete", Signal::ConfirmDelete(memory.id.clone())),
        InlineButton::new("❌ Cancel", Signal::CancelDelete),
    ]])
}

pub fn deleted() -> Reply {
    Reply::new("✅ Memory deleted.").editing()
}

pub fn delete_failed() -> Reply {
    Reply::new("❌ Could not delete that memory.").editing()
}

pub fn delete_cancelled() -> Reply {
    Reply::new("❌ Delete cancelled.").editing()
}

pub fn not_found() -> Reply {
    Reply::new("❌ Memory not found.").editing()
}
