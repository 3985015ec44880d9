use atat::atat_derive::AtatResp;

/// Commands which gets just responded by OK. Responses are evaluated by the frame parser.
#[derive(Clone, AtatResp)]
pub struct NoResponse;
