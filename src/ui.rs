use crate::models::{DashboardView, SessionView};
use axum::http::StatusCode;

pub fn render_page(view: &SessionView) -> String {
    match &view.dashboard {
        Some(dashboard) => render_dashboard(dashboard, view.connected),
        None => render_home(view),
    }
}

fn render_home(view: &SessionView) -> String {
    let (disabled, status) = match &view.model_error {
        Some(err) => ("disabled", escape_html(err)),
        None => ("", String::new()),
    };
    HOME_HTML
        .replace("{{STYLE}}", STYLE)
        .replace("{{START_DISABLED}}", disabled)
        .replace("{{MODEL_STATUS}}", &status)
}

fn render_dashboard(dashboard: &DashboardView, connected: bool) -> String {
    let metrics = dashboard.metrics;
    let hint = if !dashboard.sync_enabled {
        "Enter a name to enable cloud sync."
    } else if !connected {
        "Cloud sync is offline. Predictions and charts stay local."
    } else {
        ""
    };
    DASHBOARD_HTML
        .replace("{{STYLE}}", STYLE)
        .replace("{{TITLE}}", &escape_html(&dashboard.title))
        .replace("{{NAME}}", &escape_html(&dashboard.name))
        .replace("{{SCORE}}", &dashboard.score_label)
        .replace("{{SLEEP}}", &metrics.sleep.to_string())
        .replace("{{WORK}}", &metrics.work.to_string())
        .replace("{{EXERCISE}}", &metrics.exercise.to_string())
        .replace("{{CAFFEINE}}", &metrics.caffeine.to_string())
        .replace("{{SCREEN}}", &metrics.screen.to_string())
        .replace("{{SYNC_DISABLED}}", if dashboard.sync_enabled { "" } else { "disabled" })
        .replace("{{SYNC_HINT}}", hint)
        .replace("{{CONNECTED}}", if connected { "true" } else { "false" })
}

/// Page shown when a form post (`/start`, `/back`, `/sync`) is refused.
pub fn render_error(status: StatusCode, message: &str) -> String {
    ERROR_HTML
        .replace("{{STYLE}}", STYLE)
        .replace("{{STATUS}}", status.as_str())
        .replace("{{MESSAGE}}", &escape_html(message))
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '{' => out.push_str("&#123;"),
            _ => out.push(ch),
        }
    }
    out
}

const STYLE: &str = r#"
    @import url('https://fonts.googleapis.com/css2?family=Space+Grotesk:wght@300;400;600&display=swap');

    :root {
      --bg-1: #0b0814;
      --bg-2: #1c1233;
      --ink: #f3f0fa;
      --muted: #8f88a3;
      --accent: #722ce3;
      --card: rgba(255, 255, 255, 0.05);
      --border: rgba(114, 44, 227, 0.2);
    }

    * {
      box-sizing: border-box;
    }

    body {
      margin: 0;
      min-height: 100vh;
      background: radial-gradient(circle at top, var(--bg-2), transparent 60%), var(--bg-1);
      color: var(--ink);
      font-family: "Space Grotesk", "Trebuchet MS", sans-serif;
      display: grid;
      place-items: center;
      padding: 32px 18px 48px;
    }

    .app {
      width: min(980px, 100%);
      display: grid;
      gap: 28px;
      animation: rise 600ms ease;
    }

    h1, h2 {
      margin: 0;
      letter-spacing: 3px;
      text-align: center;
    }

    .subtitle {
      margin: 0;
      color: var(--muted);
      text-align: center;
    }

    .card {
      background: var(--card);
      border: 1px solid var(--border);
      border-radius: 20px;
      padding: 20px;
    }

    button {
      appearance: none;
      border: 1px solid var(--accent);
      border-radius: 999px;
      padding: 14px 20px;
      font-size: 1rem;
      font-weight: 600;
      color: white;
      background: var(--accent);
      cursor: pointer;
      width: 100%;
    }

    button:disabled {
      opacity: 0.4;
      cursor: not-allowed;
    }

    button.ghost {
      background: transparent;
    }

    .status {
      font-size: 0.95rem;
      color: var(--muted);
      min-height: 1.2em;
      text-align: center;
    }

    .status[data-type="error"] {
      color: #ff6b6b;
    }

    .status[data-type="ok"] {
      color: #5fd38d;
    }

    @keyframes rise {
      from {
        opacity: 0;
        transform: translateY(18px);
      }
      to {
        opacity: 1;
        transform: translateY(0);
      }
    }
"#;

const HOME_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>The Minimalist</title>
  <style>{{STYLE}}
    .hero {
      min-height: 60vh;
      display: grid;
      place-content: center;
      gap: 24px;
    }
  </style>
</head>
<body>
  <main class="app hero">
    <h1>THE MINIMALIST</h1>
    <p class="subtitle">Five habits in. One alignment score out.</p>
    <form method="post" action="/start">
      <button type="submit" {{START_DISABLED}}>Enter the dashboard</button>
    </form>
    <div class="status" data-type="error">{{MODEL_STATUS}}</div>
  </main>
</body>
</html>
"#;

const ERROR_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>The Minimalist · {{STATUS}}</title>
  <style>{{STYLE}}</style>
</head>
<body>
  <main class="app">
    <h1>THE MINIMALIST</h1>
    <div class="card">
      <p class="status" data-type="error">{{MESSAGE}}</p>
    </div>
    <a class="subtitle" href="/">Back to the app</a>
  </main>
</body>
</html>
"#;

const DASHBOARD_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>The Minimalist · Dashboard</title>
  <style>{{STYLE}}
    .layout {
      display: grid;
      grid-template-columns: 280px 1fr;
      gap: 24px;
    }

    aside {
      display: grid;
      gap: 16px;
      align-content: start;
    }

    label {
      display: grid;
      gap: 6px;
      font-size: 0.85rem;
      text-transform: uppercase;
      letter-spacing: 0.12em;
      color: var(--muted);
    }

    label output {
      color: var(--ink);
      font-size: 1rem;
      letter-spacing: 0;
    }

    input[type="text"] {
      padding: 10px 12px;
      border-radius: 12px;
      border: 1px solid var(--border);
      background: rgba(0, 0, 0, 0.3);
      color: var(--ink);
      font: inherit;
    }

    input[type="range"] {
      accent-color: var(--accent);
    }

    .score {
      text-align: center;
    }

    .score h2 {
      color: var(--muted);
      font-weight: 300;
    }

    .score .value {
      font-size: clamp(3rem, 10vw, 6rem);
      color: var(--accent);
      font-weight: 600;
    }

    .tabs {
      display: flex;
      gap: 6px;
      padding: 6px;
      background: rgba(255, 255, 255, 0.04);
      border-radius: 999px;
    }

    .tab {
      background: transparent;
      border: none;
      padding: 8px 14px;
      font-size: 0.9rem;
      color: var(--muted);
    }

    .tab.active {
      background: var(--accent);
      color: white;
    }

    #chart {
      width: 100%;
      height: 320px;
      display: block;
    }

    .chart-label {
      fill: var(--muted);
      font-size: 12px;
    }

    .chart-grid {
      fill: none;
      stroke: rgba(255, 255, 255, 0.08);
    }

    .chart-shape {
      fill: rgba(114, 44, 227, 0.3);
      stroke: var(--accent);
      stroke-width: 4;
    }

    .chart-bar {
      fill: var(--accent);
    }

    #history {
      list-style: none;
      margin: 0;
      padding: 0;
      display: grid;
      gap: 8px;
      font-family: ui-monospace, monospace;
    }

    @media (max-width: 760px) {
      .layout {
        grid-template-columns: 1fr;
      }
    }
  </style>
</head>
<body>
  <main class="app" data-connected="{{CONNECTED}}">
    <h1 id="title">{{TITLE}}</h1>

    <div class="layout">
      <aside class="card">
        <label>Identity
          <input id="name" type="text" placeholder="Your Name..." value="{{NAME}}" autocomplete="off" />
        </label>
        <label>Sleep (hours) <output id="sleep-out">{{SLEEP}}</output>
          <input id="sleep" type="range" min="4" max="10" step="0.1" value="{{SLEEP}}" />
        </label>
        <label>Work (hours) <output id="work-out">{{WORK}}</output>
          <input id="work" type="range" min="2" max="12" step="0.1" value="{{WORK}}" />
        </label>
        <label>Exercise (minutes) <output id="exercise-out">{{EXERCISE}}</output>
          <input id="exercise" type="range" min="0" max="120" step="1" value="{{EXERCISE}}" />
        </label>
        <label>Caffeine (cups) <output id="caffeine-out">{{CAFFEINE}}</output>
          <input id="caffeine" type="range" min="0" max="6" step="1" value="{{CAFFEINE}}" />
        </label>
        <label>Screen (hours) <output id="screen-out">{{SCREEN}}</output>
          <input id="screen" type="range" min="1" max="8" step="0.1" value="{{SCREEN}}" />
        </label>
        <form method="post" action="/back">
          <button class="ghost" type="submit">&larr; Back</button>
        </form>
      </aside>

      <section style="display: grid; gap: 20px;">
        <div class="card score">
          <h2>CURRENT ALIGNMENT</h2>
          <div class="value" id="score">{{SCORE}}</div>
        </div>

        <form id="sync-form" method="post" action="/sync">
          <button id="sync-btn" type="submit" {{SYNC_DISABLED}}>SYNC TO THE CLOUD</button>
        </form>
        <div class="status" id="status">{{SYNC_HINT}}</div>

        <div class="tabs" role="tablist">
          <button class="tab active" type="button" data-tab="snapshot" role="tab" aria-selected="true">Visual snapshot</button>
          <button class="tab" type="button" data-tab="metrics" role="tab" aria-selected="false">Metric chart</button>
          <button class="tab" type="button" data-tab="history" role="tab" aria-selected="false">Cloud history</button>
        </div>
        <div class="card">
          <svg id="chart" viewBox="0 0 600 320" aria-label="Metrics chart" role="img"></svg>
          <ul id="history" hidden></ul>
        </div>
      </section>
    </div>
  </main>

  <script>
    const fields = ['sleep', 'work', 'exercise', 'caffeine', 'screen'];
    const sliders = Object.fromEntries(fields.map((f) => [f, document.getElementById(f)]));
    const outputs = Object.fromEntries(fields.map((f) => [f, document.getElementById(`${f}-out`)]));
    const nameEl = document.getElementById('name');
    const titleEl = document.getElementById('title');
    const scoreEl = document.getElementById('score');
    const syncBtn = document.getElementById('sync-btn');
    const statusEl = document.getElementById('status');
    const chartEl = document.getElementById('chart');
    const historyEl = document.getElementById('history');
    const connected = document.querySelector('main').dataset.connected === 'true';
    const tabs = Array.from(document.querySelectorAll('.tab'));

    let charts = null;
    let activeTab = 'snapshot';

    const setStatus = (message, type) => {
      statusEl.textContent = message;
      statusEl.dataset.type = type || '';
    };

    const syncHint = (enabled) => {
      if (!enabled) {
        return 'Enter a name to enable cloud sync.';
      }
      return connected ? '' : 'Cloud sync is offline. Predictions and charts stay local.';
    };

    const render = (view) => {
      const dash = view.dashboard;
      if (!dash) {
        window.location.assign('/');
        return;
      }
      titleEl.textContent = dash.title;
      scoreEl.textContent = dash.score_label;
      syncBtn.disabled = !dash.sync_enabled;
      setStatus(syncHint(dash.sync_enabled), '');
      charts = dash.charts;
      renderActiveTab();
    };

    const renderRadar = (points) => {
      const cx = 300;
      const cy = 160;
      const radius = 120;
      const max = 10;
      const angle = (i) => -Math.PI / 2 + (i * 2 * Math.PI) / points.length;
      const at = (i, value) => {
        const r = (Math.max(0, Math.min(value, max)) / max) * radius;
        return `${(cx + r * Math.cos(angle(i))).toFixed(2)},${(cy + r * Math.sin(angle(i))).toFixed(2)}`;
      };
      let grid = '';
      for (let ring = 1; ring <= 4; ring += 1) {
        const ringPoints = points.map((_, i) => at(i, (max * ring) / 4)).join(' ');
        grid += `<polygon class="chart-grid" points="${ringPoints}" />`;
      }
      const labels = points
        .map((p, i) => {
          const [x, y] = at(i, max * 1.18).split(',');
          return `<text class="chart-label" x="${x}" y="${y}" text-anchor="middle">${p.axis}</text>`;
        })
        .join('');
      const shape = points.map((p, i) => at(i, p.value)).join(' ');
      chartEl.innerHTML = `${grid}<polygon class="chart-shape" points="${shape}" />${labels}`;
    };

    const renderBars = (bars) => {
      const width = 600;
      const height = 320;
      const padding = 44;
      const max = 12;
      const slot = (width - padding * 2) / bars.length;
      const scaleY = (height - padding * 2) / max;
      chartEl.innerHTML = bars
        .map((bar, i) => {
          const h = bar.hours * scaleY;
          const x = padding + i * slot + slot * 0.2;
          const y = height - padding - h;
          return `<rect class="chart-bar" x="${x}" y="${y}" width="${slot * 0.6}" height="${h}" rx="8" />
            <text class="chart-label" x="${x + slot * 0.3}" y="${y - 8}" text-anchor="middle">${bar.hours.toFixed(1)}h</text>
            <text class="chart-label" x="${x + slot * 0.3}" y="${height - padding + 20}" text-anchor="middle">${bar.metric}</text>`;
        })
        .join('');
    };

    const loadHistory = async () => {
      const res = await fetch('/api/history');
      if (!res.ok) {
        throw new Error('Unable to load history');
      }
      const history = await res.json();
      historyEl.innerHTML = '';
      if (history.message) {
        const item = document.createElement('li');
        item.textContent = history.message;
        historyEl.appendChild(item);
      }
      history.entries.forEach((entry) => {
        const item = document.createElement('li');
        item.textContent = entry.label;
        historyEl.appendChild(item);
      });
    };

    const renderActiveTab = () => {
      const showHistory = activeTab === 'history';
      chartEl.hidden = showHistory;
      historyEl.hidden = !showHistory;
      if (showHistory) {
        loadHistory().catch((err) => setStatus(err.message, 'error'));
      } else if (charts && activeTab === 'metrics') {
        renderBars(charts.bars);
      } else if (charts) {
        renderRadar(charts.radar);
      }
    };

    const setActiveTab = (tab) => {
      activeTab = tab;
      tabs.forEach((button) => {
        const isActive = button.dataset.tab === tab;
        button.classList.toggle('active', isActive);
        button.setAttribute('aria-selected', String(isActive));
      });
      renderActiveTab();
    };

    let inputSeq = 0;

    const sendInputs = async (payload) => {
      inputSeq += 1;
      const seq = inputSeq;
      const res = await fetch('/api/inputs', {
        method: 'POST',
        headers: { 'content-type': 'application/json' },
        body: JSON.stringify(payload)
      });
      // a newer update is in flight; its response wins
      if (seq !== inputSeq) {
        return;
      }
      if (!res.ok) {
        const msg = await res.text();
        throw new Error(msg || 'Update failed');
      }
      render(await res.json());
    };

    const sync = async () => {
      setStatus('Syncing...', 'info');
      const res = await fetch('/api/sync', { method: 'POST' });
      if (!res.ok) {
        const msg = await res.text();
        throw new Error(msg || 'Sync failed');
      }
      const body = await res.json();
      setStatus(body.message, 'ok');
      if (activeTab === 'history') {
        loadHistory().catch((err) => setStatus(err.message, 'error'));
      }
    };

    const refresh = async () => {
      const res = await fetch('/api/session');
      if (!res.ok) {
        throw new Error('Unable to load session');
      }
      render(await res.json());
    };

    fields.forEach((field) => {
      sliders[field].addEventListener('input', () => {
        outputs[field].textContent = sliders[field].value;
        sendInputs({ [field]: Number(sliders[field].value) }).catch((err) => setStatus(err.message, 'error'));
      });
    });

    nameEl.addEventListener('input', () => {
      sendInputs({ name: nameEl.value }).catch((err) => setStatus(err.message, 'error'));
    });

    tabs.forEach((button) => {
      button.addEventListener('click', () => setActiveTab(button.dataset.tab));
    });

    document.getElementById('sync-form').addEventListener('submit', (event) => {
      event.preventDefault();
      sync().catch((err) => setStatus(err.message, 'error'));
    });

    refresh().catch((err) => setStatus(err.message, 'error'));
  </script>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charts::build_charts;
    use crate::models::Metrics;
    use crate::session::Screen;

    fn dashboard(name: &str, sync_enabled: bool) -> SessionView {
        SessionView {
            screen: Screen::Dashboard,
            model_ready: true,
            model_error: None,
            connected: true,
            dashboard: Some(DashboardView {
                title: format!("THE MINIMALIST x {}", name.to_uppercase()),
                name: name.to_string(),
                metrics: Metrics::default(),
                score: 80.0,
                score_label: "80.0%".into(),
                sync_enabled,
                charts: build_charts(&Metrics::default()),
            }),
        }
    }

    #[test]
    fn home_disables_start_without_model() {
        let page = render_page(&SessionView {
            screen: Screen::Home,
            model_ready: false,
            model_error: Some("model artifact <x> is unavailable".into()),
            connected: false,
            dashboard: None,
        });
        assert!(page.contains(r#"<button type="submit" disabled>"#));
        assert!(page.contains("model artifact &lt;x&gt; is unavailable"));
        assert!(!page.contains("{{"));
    }

    #[test]
    fn dashboard_escapes_name_and_fills_sliders() {
        let page = render_page(&dashboard("<b>bob</b>", true));
        assert!(page.contains("&lt;b&gt;bob&lt;/b&gt;"));
        assert!(!page.contains("<b>bob</b>"));
        assert!(page.contains(r#"id="sleep" type="range" min="4" max="10" step="0.1" value="7.5""#));
        assert!(page.contains(r#"<button id="sync-btn" type="submit" >"#));
        assert!(!page.contains("{{"));
    }

    #[test]
    fn error_page_escapes_message_and_links_home() {
        let page = render_error(StatusCode::CONFLICT, "the name '<Bob>' is already taken");
        assert!(page.contains("the name &#39;&lt;Bob&gt;&#39; is already taken"));
        assert!(page.contains("The Minimalist · 409"));
        assert!(page.contains(r#"href="/""#));
        assert!(!page.contains("{{"));
    }

    #[test]
    fn stale_input_responses_are_dropped() {
        let page = render_page(&dashboard("bob", true));
        assert!(page.contains("if (seq !== inputSeq)"));
    }

    #[test]
    fn dashboard_without_name_disables_sync() {
        let page = render_page(&dashboard("", false));
        assert!(page.contains(r#"<button id="sync-btn" type="submit" disabled>"#));
        assert!(page.contains("Enter a name to enable cloud sync."));
    }
}
