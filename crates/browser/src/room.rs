//! ZEP room driven through the page's DOM.
//!
//! Bubbles are tagged with a `data-bot-id` on first sight so they can be
//! addressed again, and with `data-bot-seen="1"` once consumed. Both markers
//! live on the DOM node, so a re-rendered bubble counts as new.

use async_trait::async_trait;
use breakbot_core::config::RoomConfig;
use breakbot_core::{
    looks_like_sender, AttributionResolver, ChatFeed, ChatInput, Config, Error, FeedItem, Paths,
    Result,
};
use serde_json::Value;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::cdp::{CdpClient, MODIFIER_CTRL, MODIFIER_META};
use crate::session::ChromeSession;

const NICKNAME_WAIT: Duration = Duration::from_secs(6);
const ENTRY_SETTLE: Duration = Duration::from_secs(3);
const CHAT_INPUT_WAIT: Duration = Duration::from_secs(15);
const SELECTOR_POLL: Duration = Duration::from_millis(200);

/// Parent/sibling hops walked when looking for a name near a bubble.
const SENDER_SEARCH_HOPS: usize = 4;

/// JSON-quotes `s` for embedding in a script.
fn js_str(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

fn bubble_selector_for(id: &str) -> String {
    format!("[data-bot-id=\"{}\"]", id)
}

fn fetch_script(bubble_selector: &str) -> String {
    format!(
        r#"(() => {{
  const out = [];
  let seq = window.__breakbotSeq || 0;
  document.querySelectorAll({sel}).forEach((el) => {{
    let id = el.getAttribute('data-bot-id');
    if (!id) {{
      seq += 1;
      id = 'b' + seq;
      el.setAttribute('data-bot-id', id);
    }}
    out.push({{
      id,
      text: el.innerText || '',
      y: el.getBoundingClientRect().top,
      consumed: el.getAttribute('data-bot-seen') === '1',
    }});
  }});
  window.__breakbotSeq = seq;
  return out;
}})()"#,
        sel = js_str(bubble_selector)
    )
}

fn mark_one_script(id: &str) -> String {
    format!(
        r#"(() => {{
  const el = document.querySelector({sel});
  if (!el) return false;
  el.setAttribute('data-bot-seen', '1');
  return true;
}})()"#,
        sel = js_str(&bubble_selector_for(id))
    )
}

fn mark_all_script(bubble_selector: &str) -> String {
    format!(
        r#"(() => {{
  const els = document.querySelectorAll({sel});
  els.forEach((el) => el.setAttribute('data-bot-seen', '1'));
  return els.length;
}})()"#,
        sel = js_str(bubble_selector)
    )
}

/// Texts of the elements visited while walking back from a bubble, nearest
/// first. `null` when the bubble is gone.
fn sender_candidates_script(id: &str) -> String {
    format!(
        r#"(() => {{
  let h = document.querySelector({sel});
  if (!h) return null;
  const out = [];
  for (let i = 0; i < {hops} && h; i++) {{
    let next = null;
    const prev = h.previousElementSibling;
    if (prev && prev.innerText && prev.innerText.trim()) {{
      next = prev;
    }} else if (h.parentElement) {{
      const pp = h.parentElement.previousElementSibling;
      next = (pp && pp.innerText && pp.innerText.trim()) ? pp : h.parentElement;
    }}
    if (!next) break;
    out.push((next.innerText || '').trim());
    h = next;
  }}
  return out;
}})()"#,
        sel = js_str(&bubble_selector_for(id)),
        hops = SENDER_SEARCH_HOPS
    )
}

fn exists_script(selector: &str) -> String {
    format!("!!document.querySelector({})", js_str(selector))
}

fn focus_script(selector: &str) -> String {
    format!(
        r#"(() => {{
  const el = document.querySelector({sel});
  if (!el) return false;
  el.scrollIntoView({{ block: 'center' }});
  el.focus();
  el.click();
  return true;
}})()"#,
        sel = js_str(selector)
    )
}

fn value_script(selector: &str) -> String {
    format!(
        r#"(() => {{
  const el = document.querySelector({sel});
  return el ? el.value : null;
}})()"#,
        sel = js_str(selector)
    )
}

/// Empties the field through the native setter so framework-controlled
/// inputs see the change.
fn force_clear_script(selector: &str) -> String {
    format!(
        r#"(() => {{
  const el = document.querySelector({sel});
  if (!el) return false;
  const proto = el.tagName === 'TEXTAREA' ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype;
  const desc = Object.getOwnPropertyDescriptor(proto, 'value');
  if (desc && desc.set) {{ desc.set.call(el, ''); }} else {{ el.value = ''; }}
  el.dispatchEvent(new Event('input', {{ bubbles: true }}));
  return true;
}})()"#,
        sel = js_str(selector)
    )
}

fn toast_visible_script(text: &str) -> String {
    format!(
        r#"(() => {{
  const needle = {text};
  return Array.from(document.querySelectorAll('div')).some((el) =>
    (el.innerText || '').includes(needle) &&
    el.getClientRects().length > 0 &&
    getComputedStyle(el).visibility !== 'hidden');
}})()"#,
        text = js_str(text)
    )
}

fn click_button_script(labels: &[String]) -> String {
    let labels = Value::Array(labels.iter().map(|l| Value::String(l.clone())).collect());
    format!(
        r#"(() => {{
  const labels = {labels};
  const buttons = Array.from(document.querySelectorAll('button'));
  for (const label of labels) {{
    const btn = buttons.find((b) => (b.innerText || '').includes(label));
    if (btn) {{
      btn.click();
      return label;
    }}
  }}
  return null;
}})()"#,
        labels = labels
    )
}

/// First candidate that reads like a participant name.
fn pick_sender(candidates: &[String]) -> Option<String> {
    candidates
        .iter()
        .map(|c| c.trim())
        .find(|c| looks_like_sender(c))
        .map(|c| c.to_string())
}

pub struct ZepRoom {
    session: ChromeSession,
    room: RoomConfig,
}

impl ZepRoom {
    /// Launches the browser. Call [`ZepRoom::enter_as_guest`] next.
    pub async fn open(config: &Config, paths: &Paths) -> Result<Self> {
        let session = ChromeSession::launch(&config.browser, paths.browser_profile("zep")).await?;
        Ok(Self {
            session,
            room: config.room.clone(),
        })
    }

    fn cdp(&self) -> &CdpClient {
        &self.session.cdp
    }

    async fn eval(&self, script: &str) -> Result<Value> {
        self.cdp().evaluate(script).await
    }

    /// Polls for `selector`. Script errors during navigation count as "not
    /// yet".
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let script = exists_script(selector);
        loop {
            if let Ok(Value::Bool(true)) = self.eval(&script).await {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(SELECTOR_POLL).await;
        }
    }

    async fn select_all_and_delete(&self) -> Result<()> {
        let modifier = if cfg!(target_os = "macos") {
            MODIFIER_META
        } else {
            MODIFIER_CTRL
        };
        self.cdp().press_key("a", "KeyA", 65, modifier).await?;
        self.cdp().press_key("Backspace", "Backspace", 8, 0).await
    }

    /// Focuses `selector` and replaces its content with nothing.
    async fn clear_field(&self, selector: &str) -> Result<()> {
        let focused = self.eval(&focus_script(selector)).await?;
        if focused != Value::Bool(true) {
            return Err(Error::Browser(format!("element not found: {}", selector)));
        }

        let cleared = match self.select_all_and_delete().await {
            Ok(()) => matches!(
                self.eval(&value_script(selector)).await,
                Ok(Value::String(ref v)) if v.is_empty()
            ),
            Err(e) => {
                debug!(error = %e, "Keyboard clear failed");
                false
            }
        };
        if !cleared {
            self.eval(&force_clear_script(selector)).await?;
        }
        Ok(())
    }

    /// Joins the room as a guest under the configured bot name and waits for
    /// the chat input to show up.
    pub async fn enter_as_guest(&self) -> Result<()> {
        info!(url = %self.room.play_url, "Opening ZEP room");
        self.cdp().navigate(&self.room.play_url).await?;

        if self
            .wait_for_selector(&self.room.nickname_input_selector, NICKNAME_WAIT)
            .await
        {
            let nickname = &self.room.nickname_input_selector;
            match self.clear_field(nickname).await {
                Ok(()) => {
                    if let Err(e) = self.cdp().insert_text(&self.room.bot_name).await {
                        warn!(error = %e, "Failed to type nickname");
                    }
                }
                Err(e) => warn!(error = %e, "Failed to focus nickname input"),
            }
        } else {
            debug!("No nickname prompt shown");
        }

        match self
            .eval(&click_button_script(&self.room.enter_button_labels))
            .await
        {
            Ok(Value::String(label)) => debug!(label = %label, "Clicked entry button"),
            Ok(_) => debug!("No entry button found"),
            Err(e) => warn!(error = %e, "Failed to click entry button"),
        }

        sleep(ENTRY_SETTLE).await;

        if !self
            .wait_for_selector(&self.room.chat_input_selector, CHAT_INPUT_WAIT)
            .await
        {
            return Err(Error::Timeout(format!(
                "chat input did not appear within {}s",
                CHAT_INPUT_WAIT.as_secs()
            )));
        }
        info!(name = %self.room.bot_name, "Joined ZEP room");
        Ok(())
    }

    pub async fn close(&self) {
        self.session.close().await;
    }
}

#[async_trait]
impl ChatFeed for ZepRoom {
    async fn fetch_items(&self) -> Result<Vec<FeedItem>> {
        let value = self.eval(&fetch_script(&self.room.bubble_selector)).await?;
        serde_json::from_value(value).map_err(|e| Error::Feed(format!("bad bubble list: {}", e)))
    }

    async fn mark_consumed(&self, item_id: &str) -> Result<()> {
        match self.eval(&mark_one_script(item_id)).await? {
            Value::Bool(true) => Ok(()),
            _ => Err(Error::Feed(format!("bubble {} is gone", item_id))),
        }
    }

    async fn mark_all_consumed(&self) -> Result<usize> {
        let value = self.eval(&mark_all_script(&self.room.bubble_selector)).await?;
        Ok(value.as_u64().unwrap_or(0) as usize)
    }
}

#[async_trait]
impl AttributionResolver for ZepRoom {
    async fn resolve_sender(&self, item_id: &str) -> Result<Option<String>> {
        let value = self.eval(&sender_candidates_script(item_id)).await?;
        if value.is_null() {
            return Err(Error::Feed(format!("bubble {} is gone", item_id)));
        }
        let candidates: Vec<String> = serde_json::from_value(value)?;
        Ok(pick_sender(&candidates))
    }
}

#[async_trait]
impl ChatInput for ZepRoom {
    async fn input_available(&self) -> Result<bool> {
        let value = self
            .eval(&exists_script(&self.room.chat_input_selector))
            .await?;
        Ok(value == Value::Bool(true))
    }

    async fn rate_limited(&self) -> Result<bool> {
        let value = self
            .eval(&toast_visible_script(&self.room.cooldown_toast_text))
            .await?;
        Ok(value == Value::Bool(true))
    }

    async fn submit(&self, text: &str) -> Result<()> {
        self.clear_field(&self.room.chat_input_selector).await?;
        self.cdp().insert_text(text).await?;
        self.cdp().press_key("Enter", "Enter", 13, 0).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selectors_are_quoted() {
        let script = exists_script(r#"input[placeholder="채팅을 입력해 주세요"]"#);
        assert_eq!(
            script,
            r#"!!document.querySelector("input[placeholder=\"채팅을 입력해 주세요\"]")"#
        );
    }

    #[test]
    fn test_bubble_lookup_selector() {
        assert_eq!(bubble_selector_for("b12"), r#"[data-bot-id="b12"]"#);
        assert!(mark_one_script("b12").contains(r#"[data-bot-id=\"b12\"]"#));
    }

    #[test]
    fn test_pick_sender_skips_command_lines() {
        let candidates = vec![
            "#휴식 10".to_string(),
            "10분 쉴게요".to_string(),
            " 영희 ".to_string(),
            "철수".to_string(),
        ];
        assert_eq!(pick_sender(&candidates), Some("영희".to_string()));
        assert_eq!(pick_sender(&[]), None);
        assert_eq!(pick_sender(&["".to_string()]), None);
    }

    #[test]
    fn test_button_labels_embedded_in_order() {
        let labels = vec!["Enter".to_string(), "입장".to_string()];
        assert!(click_button_script(&labels).contains(r#"["Enter","입장"]"#));
    }

    #[test]
    fn test_feed_item_parses_from_script_shape() {
        let raw = serde_json::json!([
            { "id": "b1", "text": "철수\n#휴식 10", "y": 120.5, "consumed": false },
            { "id": "b2", "text": "", "y": 160.0, "consumed": true }
        ]);
        let items: Vec<FeedItem> = serde_json::from_value(raw).unwrap();
        assert_eq!(items.len(), 2);
        assert!(!items[0].consumed);
        assert!(items[1].consumed);
    }
}
