use rand::seq::SliceRandom;
use rand::Rng;

pub const START_TEMPLATES: &[&str] = &[
    "#휴식 {m}분 시작 - by {who}",
    "⏱️ {m}분 쉬어요!! - {who}",
    "휴식 {m}분 가즈아~ 🙌 - {who}",
];

pub const END_TEMPLATES: &[&str] = &[
    "⏰휴식 종료 - {who}",
    "⏰끝! 다시 고! — {who}",
    "⏰휴식 {m}분 끝났어요. 파이팅 💪{who}✏️",
];

fn render(template: &str, minutes: u32, who: &str) -> String {
    template
        .replace("{m}", &minutes.to_string())
        .replace("{who}", who)
}

pub fn start_announcement<R: Rng + ?Sized>(rng: &mut R, minutes: u32, who: &str) -> String {
    let template = START_TEMPLATES.choose(rng).copied().unwrap_or(START_TEMPLATES[0]);
    render(template, minutes, who)
}

pub fn end_announcement<R: Rng + ?Sized>(rng: &mut R, minutes: u32, who: &str) -> String {
    let template = END_TEMPLATES.choose(rng).copied().unwrap_or(END_TEMPLATES[0]);
    render(template, minutes, who)
}
