use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tower_http::cors::CorsLayer;

use crate::config::Settings;
use crate::controller::RefreshOutcome;
use crate::dashboard::Dashboard;
use crate::error::DashboardError;
use crate::filter::{DateSpan, FilterValue};
use crate::widgets::{FilterEvent, RecordingSurface};

#[derive(Clone)]
pub struct PreviewState {
    pub settings: Settings,
    pub dashboard: Arc<Dashboard>,
    pub surface: Arc<RecordingSurface>,
}

pub fn router(state: PreviewState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/state", get(api_state))
        .route("/api/charts", get(api_charts))
        .route("/api/health", get(api_health))
        .route("/api/filter/toggle", post(api_toggle))
        .route("/api/hash", post(api_hash))
        .route("/api/date_span", post(api_date_span))
        .route("/api/history/back", post(api_back))
        .route("/api/history/forward", post(api_forward))
        .route("/api/page/next", post(api_next_page))
        .route("/api/page/prev", post(api_prev_page))
        .route("/api/calls/field", post(api_call_field))
        .route("/api/resize", post(api_resize))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve_preview(
    settings: Settings,
    dashboard: Arc<Dashboard>,
    surface: Arc<RecordingSurface>,
) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", settings.preview_host, settings.preview_port)
        .parse()
        .map_err(|e| anyhow!("preview addr parse: {e}"))?;
    let app = router(PreviewState {
        settings,
        dashboard,
        surface,
    });

    log::info!("preview.start url=http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index(State(st): State<PreviewState>) -> impl IntoResponse {
    Html(render_index_html(
        &st.settings.preview_host,
        st.settings.preview_port,
        st.dashboard.kind().as_str(),
        &st.settings.agency_code,
    ))
}

async fn api_state(State(st): State<PreviewState>) -> impl IntoResponse {
    Json(st.dashboard.state_json())
}

async fn api_charts(State(st): State<PreviewState>) -> impl IntoResponse {
    Json(st.surface.frames())
}

async fn api_health(State(st): State<PreviewState>) -> impl IntoResponse {
    let ctl = st.dashboard.controller();
    Json(json!({
        "ts": now_ts(),
        "id": st.dashboard.id().to_string(),
        "issued": ctl.issued(),
        "committed": ctl.committed(),
        "draws": st.surface.draw_count(),
    }))
}

fn outcome_response(st: &PreviewState, res: Result<Option<RefreshOutcome>, DashboardError>) -> Response {
    match res {
        Ok(outcome) => Json(json!({
            "ok": true,
            "outcome": outcome,
            "state": st.dashboard.state_json(),
        }))
        .into_response(),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({"ok": false, "error": e.to_string()})),
        )
            .into_response(),
    }
}

fn bad_request(msg: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"ok": false, "error": msg})),
    )
        .into_response()
}

#[derive(Deserialize)]
struct ToggleReq {
    key: String,
    value: JsonValue,
}

async fn api_toggle(State(st): State<PreviewState>, Json(req): Json<ToggleReq>) -> Response {
    let Some(value) = FilterValue::from_json(&req.key, &req.value) else {
        return bad_request(format!("bad value for {}: {}", req.key, req.value));
    };
    let handle = st.dashboard.dispatch(FilterEvent {
        key: req.key,
        value,
    });
    match handle.await {
        Ok(res) => outcome_response(&st, res.map(Some)),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"ok": false, "error": e.to_string()})),
        )
            .into_response(),
    }
}

#[derive(Deserialize)]
struct HashReq {
    fragment: String,
}

async fn api_hash(State(st): State<PreviewState>, Json(req): Json<HashReq>) -> Response {
    let res = st.dashboard.navigate(&req.fragment).await;
    outcome_response(&st, res)
}

#[derive(Deserialize)]
struct DateSpanReq {
    span: String,
}

async fn api_date_span(State(st): State<PreviewState>, Json(req): Json<DateSpanReq>) -> Response {
    let Some(span) = DateSpan::parse(&req.span) else {
        return bad_request(format!("unknown span {} (7days|28days|ytd)", req.span));
    };
    let res = st.dashboard.filter_by_date(span).await;
    outcome_response(&st, res)
}

async fn api_back(State(st): State<PreviewState>) -> Response {
    let res = st.dashboard.back().await;
    outcome_response(&st, res)
}

async fn api_forward(State(st): State<PreviewState>) -> Response {
    let res = st.dashboard.forward().await;
    outcome_response(&st, res)
}

async fn api_next_page(State(st): State<PreviewState>) -> Response {
    let res = st.dashboard.next_page().await;
    outcome_response(&st, res)
}

async fn api_prev_page(State(st): State<PreviewState>) -> Response {
    let res = st.dashboard.prev_page().await;
    outcome_response(&st, res)
}

#[derive(Deserialize)]
struct CallFieldReq {
    field: String,
    value: JsonValue,
}

async fn api_call_field(State(st): State<PreviewState>, Json(req): Json<CallFieldReq>) -> Response {
    if FilterValue::from_json(&req.field, &req.value).is_none() {
        return bad_request(format!("bad value for {}: {}", req.field, req.value));
    }
    let res = st.dashboard.click_field(&req.field, &req.value).await;
    outcome_response(&st, res)
}

#[derive(Deserialize)]
struct ResizeReq {
    width: Option<u32>,
}

async fn api_resize(State(st): State<PreviewState>, Json(req): Json<ResizeReq>) -> impl IntoResponse {
    if let Some(width) = req.width {
        for w in st.dashboard.widgets() {
            st.surface.set_width(w.mount(), width);
        }
    }
    let redrawn = st.dashboard.resize();
    Json(json!({"ok": true, "redrawn": redrawn}))
}

fn render_index_html(host: &str, port: u16, kind: &str, agency: &str) -> String {
    // Single-file UI, no build step. Charts are shown as their latest frames.
    format!(
        r#"<!doctype html>
 <html lang="en">
   <head>
     <meta charset="utf-8" />
     <meta name="viewport" content="width=device-width, initial-scale=1" />
     <title>CFS Dashboard • Preview</title>
     <style>
       :root {{
         --bg: #0b1220;
         --panel: rgba(255,255,255,0.06);
         --stroke: rgba(255,255,255,0.12);
         --text: rgba(255,255,255,0.92);
         --muted: rgba(255,255,255,0.65);
         --good: #33d17a;
         --bad: #ff4d4d;
         --brand: #3182bd;
         --brand2: #9edae5;
       }}
       * {{ box-sizing: border-box; }}
       body {{
         margin: 0;
         font-family: ui-sans-serif, system-ui, -apple-system, Segoe UI, Roboto, Helvetica, Arial;
         color: var(--text);
         background: radial-gradient(1200px 900px at 15% 10%, rgba(49,130,189,0.22), transparent 60%), var(--bg);
       }}
       .wrap {{ max-width: 1280px; margin: 0 auto; padding: 22px 18px 42px; }}
       .topbar {{
         display: flex; align-items: center; justify-content: space-between; gap: 12px;
         padding: 16px; border: 1px solid var(--stroke); border-radius: 16px;
         background: linear-gradient(180deg, rgba(255,255,255,0.06), rgba(255,255,255,0.03));
       }}
       .title {{ font-weight: 800; letter-spacing: 0.2px; }}
       .subtitle {{ color: var(--muted); font-size: 12px; margin-top: 2px; }}
       .chips {{ display: flex; flex-wrap: wrap; gap: 8px; justify-content: flex-end; }}
       .chip {{
         padding: 7px 10px; border-radius: 999px; border: 1px solid var(--stroke);
         background: rgba(255,255,255,0.04); font-size: 12px; color: var(--muted); white-space: nowrap;
       }}
       .chip b {{ color: var(--text); }}
       .grid {{ display: grid; gap: 14px; margin-top: 14px; grid-template-columns: repeat(12, 1fr); }}
       .card {{ border: 1px solid var(--stroke); border-radius: 16px; background: var(--panel); overflow: hidden; }}
       .card .hd {{
         display:flex; align-items: center; justify-content: space-between; gap: 10px;
         padding: 12px 14px; border-bottom: 1px solid rgba(255,255,255,0.08);
       }}
       .card .bd {{ padding: 12px 14px; }}
       .pill {{ font-size: 12px; color: var(--muted); border: 1px solid var(--stroke); padding: 3px 8px; border-radius: 999px; }}
       table {{ width: 100%; border-collapse: collapse; }}
       td {{ padding: 6px 8px; border-bottom: 1px solid rgba(255,255,255,0.07); font-size: 13px; }}
       tr.click {{ cursor: pointer; }}
       tr.click:hover {{ background: rgba(255,255,255,0.05); }}
       td.field {{ cursor: pointer; }}
       td.field:hover {{ color: var(--brand); }}
       .bar {{ height: 10px; border-radius: 999px; background: linear-gradient(90deg, var(--brand), var(--brand2)); }}
       .btn {{
         cursor: pointer; padding: 8px 10px; border-radius: 10px;
         border: 1px solid rgba(255,255,255,0.12); background: rgba(255,255,255,0.05);
         color: var(--text); font-weight: 700; font-size: 12px;
       }}
       .mono {{ font-family: ui-monospace, SFMono-Regular, Menlo, Monaco, Consolas, monospace; }}
       .bad {{ color: var(--bad); }}
       .col-12 {{ grid-column: span 12; }}
       .col-6 {{ grid-column: span 6; }}
       @media (max-width: 1100px) {{ .col-6 {{ grid-column: span 12; }} }}
     </style>
   </head>
   <body>
     <div class="wrap">
       <div class="topbar">
         <div>
           <div class="title">CFS Dashboard • {kind}</div>
           <div class="subtitle">Local: <span class="mono">{host}:{port}</span> • agency=<b>{agency}</b></div>
         </div>
         <div class="chips">
           <div class="chip">Filter: <b class="mono" id="fragment">--</b></div>
           <div class="chip">Status: <b id="statusText">starting…</b></div>
           <button class="btn" id="backBtn">Back</button>
           <button class="btn" id="fwdBtn">Forward</button>
           <button class="btn" data-span="7days">7 days</button>
           <button class="btn" data-span="28days">28 days</button>
           <button class="btn" data-span="ytd">YTD</button>
         </div>
       </div>
       <div class="chip bad" id="err" style="display:none; margin-top: 12px;"></div>
       <div class="grid" id="charts"></div>
     </div>
     <script>
       async function getJson(url) {{
         const r = await fetch(url);
         if (!r.ok) throw new Error(`${{url}}: ${{r.status}}`);
         return r.json();
       }}
       async function post(url, body) {{
         const r = await fetch(url, {{
           method: "POST",
           headers: {{ "content-type": "application/json" }},
           body: JSON.stringify(body || {{}}),
         }});
         const j = await r.json();
         const err = document.getElementById("err");
         if (!j.ok) {{ err.textContent = j.error; err.style.display = "block"; }}
         else {{ err.style.display = "none"; }}
         await refresh();
       }}
       function escapeHtml(s) {{
         return String(s).replace(/[&<>"']/g, (c) => ({{"&":"&amp;","<":"&lt;",">":"&gt;",'"':"&quot;","'":"&#39;"}})[c]);
       }}
       function rows(frame) {{
         const out = [];
         const groups = Array.isArray(frame.series) ? frame.series : [];
         for (const g of groups) {{
           if (g && Array.isArray(g.values)) {{
             for (const v of g.values) out.push({{ group: g.key, label: v.name ?? v.x, value: v.value ?? v.y, id: v.id }});
           }} else if (g && g.day !== undefined) {{
             out.push({{ group: "", label: `d${{g.day}} h${{g.hour}}`, value: g.value }});
           }}
         }}
         if (!groups.length && frame.series && typeof frame.series === "object") {{
           for (const [k, v] of Object.entries(frame.series)) out.push({{ group: "", label: k, value: v }});
         }}
         return out;
       }}
       function renderFrame(frame) {{
         const data = rows(frame);
         const max = Math.max(1, ...data.map((d) => Number(d.value) || 0));
         const body = data.slice(0, 40).map((d) => `
           <tr class="${{d.id !== undefined ? "click" : ""}}" data-mount="${{escapeHtml(frame.mount)}}" data-id="${{d.id ?? ""}}">
             <td class="mono">${{escapeHtml(d.label)}}</td>
             <td style="width:55%"><div class="bar" style="width:${{Math.round(100 * (Number(d.value) || 0) / max)}}%"></div></td>
             <td>${{d.value ?? "--"}}</td>
           </tr>`).join("");
         return `<div class="card col-6">
           <div class="hd"><b>${{escapeHtml(frame.mount)}}</b><span class="pill">${{frame.kind}} ${{frame.width}}×${{frame.height}}</span></div>
           <div class="bd"><table>${{body}}</table></div>
         </div>`;
       }}
       function renderCalls(state) {{
         if (!Array.isArray(state.calls)) return "";
         const p = state.pagination || {{}};
         const fields = ["call_id", "time_received", "nature", "priority", "beat", "district", "cancelled"];
         const head = fields.map((f) => `<td><b>${{f}}</b></td>`).join("");
         const body = state.calls.map((c) => `<tr>${{fields.map((f) => {{
           const v = c[f];
           const shown = v === null || v === undefined ? "None" : (typeof v === "object" ? (v.descriptive_text ?? JSON.stringify(v)) : v);
           const raw = v && typeof v === "object" ? v.id : v;
           return `<td class="field mono" data-field="${{f}}" data-value="${{escapeHtml(JSON.stringify(raw ?? null))}}">${{escapeHtml(shown)}}</td>`;
         }}).join("")}}</tr>`).join("");
         return `<div class="card col-12">
           <div class="hd"><b>Calls ${{(p.page - 1) * p.per_page + 1}}-${{p.top_count}} of ${{p.count}}</b>
             <span><button class="btn" id="prevPage">Prev</button> <button class="btn" id="nextPage">Next</button></span></div>
           <div class="bd"><table><tr>${{head}}</tr>${{body}}</table></div>
         </div>`;
       }}
       async function refresh() {{
         try {{
           const [state, charts] = await Promise.all([getJson("/api/state"), getJson("/api/charts")]);
           document.getElementById("fragment").textContent = state.fragment || "(none)";
           document.getElementById("statusText").textContent = state.loading ? "loading" : "idle";
           document.getElementById("charts").innerHTML = renderCalls(state) + charts.map(renderFrame).join("");
         }} catch (e) {{
           document.getElementById("statusText").textContent = "disconnected";
         }}
       }}
       document.getElementById("charts").addEventListener("click", (ev) => {{
         if (ev.target.id === "nextPage") return post("/api/page/next");
         if (ev.target.id === "prevPage") return post("/api/page/prev");
         const td = ev.target.closest("td.field");
         if (td) {{
           const value = JSON.parse(td.dataset.value);
           if (value !== null) post("/api/calls/field", {{ field: td.dataset.field, value }});
           return;
         }}
         const tr = ev.target.closest("tr.click");
         if (!tr) return;
         const mount = tr.dataset.mount;
         const id = Number(tr.dataset.id);
         getJson("/api/charts").then((charts) => {{
           const frame = charts.find((c) => c.mount === mount);
           const key = frame && frame.options && frame.options.filter_key;
           if (key) post("/api/filter/toggle", {{ key, value: id }});
         }});
       }});
       document.getElementById("backBtn").addEventListener("click", () => post("/api/history/back"));
       document.getElementById("fwdBtn").addEventListener("click", () => post("/api/history/forward"));
       for (const b of document.querySelectorAll("[data-span]")) {{
         b.addEventListener("click", () => post("/api/date_span", {{ span: b.dataset.span }}));
       }}
       window.addEventListener("resize", () => post("/api/resize", {{ width: Math.floor(window.innerWidth / 2) }}));
       refresh();
       setInterval(refresh, 1500);
     </script>
   </body>
 </html>"#,
        host = host,
        port = port,
        kind = kind,
        agency = agency,
    )
}

fn now_ts() -> f64 {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    now.as_secs_f64()
}
