use serde::Deserialize;
use serde_json::Value;

use crate::core::{
    decimal,
    error::ExchangeError,
    mapper::{self, decode},
    types::*,
};

#[derive(Deserialize)]
struct OkxResponse {
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Value,
}

/// 拆开 {code, msg, data} 外壳，code 非 "0" 时报 ApiError
///
/// 已经拆开的 data 数组原样返回。
pub fn unwrap_envelope(raw: &Value) -> Result<Value> {
    if raw.is_array() {
        return Ok(raw.clone());
    }

    let response: OkxResponse = decode("okx 响应", raw)?;
    if response.code != "0" {
        return Err(ExchangeError::ApiError {
            code: response.code.parse().unwrap_or(-1),
            message: response.msg,
        });
    }
    match response.data {
        Value::Null => Err(ExchangeError::ApiError {
            code: 0,
            message: "API返回空数据".to_string(),
        }),
        data => Ok(data),
    }
}

#[derive(Deserialize)]
struct OkxAccount {
    #[serde(default)]
    details: Vec<OkxBalanceDetail>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OkxBalanceDetail {
    ccy: String,
    #[serde(default)]
    avail_bal: String,
    #[serde(default)]
    frozen_bal: String,
}

/// 统一账户余额，现货与合约共用
pub fn map_balances(raw: &Value) -> Result<Vec<Balance>> {
    let accounts: Vec<OkxAccount> = decode("okx 账户", &unwrap_envelope(raw)?)?;

    let mut balances = Vec::new();
    for detail in accounts.into_iter().flat_map(|a| a.details) {
        if mapper::is_empty_balance(&detail.avail_bal, &detail.frozen_bal)? {
            continue;
        }
        balances.push(mapper::make_balance(
            &detail.ccy,
            &detail.avail_bal,
            &detail.frozen_bal,
        )?);
    }
    Ok(balances)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OkxPosition {
    inst_id: String,
    pos: String,
    pos_side: String,
    mgn_mode: String,
    #[serde(default)]
    avg_px: String,
    #[serde(default)]
    mark_px: String,
    #[serde(default)]
    upl: String,
    #[serde(default)]
    lever: String,
    #[serde(default)]
    liq_px: String,
    #[serde(default)]
    margin: String,
    #[serde(default)]
    notional_usd: String,
}

fn or_zero(value: String) -> String {
    if value.is_empty() {
        "0".to_string()
    } else {
        value
    }
}

/// 持仓。net 模式按数量符号判断方向
pub fn map_positions(raw: &Value) -> Result<Vec<PositionRisk>> {
    let positions: Vec<OkxPosition> = decode("okx 持仓", &unwrap_envelope(raw)?)?;

    let mut result = Vec::new();
    for p in positions {
        if decimal::parse_or_zero("pos", &p.pos)?.is_zero() {
            continue;
        }
        let (negative, amount) = mapper::split_sign("pos", &p.pos)?;
        let position_side = match p.pos_side.as_str() {
            "long" => PositionSide::Long,
            "short" => PositionSide::Short,
            "net" if negative => PositionSide::Short,
            "net" => PositionSide::Long,
            other => return Err(ExchangeError::unrecognized("posSide", other)),
        };
        let margin_type = match p.mgn_mode.as_str() {
            "cross" => MarginType::Crossed,
            "isolated" => MarginType::Isolated,
            other => return Err(ExchangeError::unrecognized("mgnMode", other)),
        };

        result.push(PositionRisk {
            symbol: p.inst_id,
            position_side,
            position_amt: amount,
            entry_price: or_zero(p.avg_px),
            mark_price: or_zero(p.mark_px),
            unrealized_profit: or_zero(p.upl),
            leverage: or_zero(p.lever),
            liquidation_price: or_zero(p.liq_px),
            margin_type,
            isolated_margin: or_zero(p.margin),
            notional: or_zero(p.notional_usd),
        });
    }
    Ok(result)
}
