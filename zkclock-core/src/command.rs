//! Device command table

use std::fmt;

use crate::error::{Error, Result};

/// Protocol command codes
///
/// Requests sent to the terminal and the acknowledgements it answers with.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Command {
    // Session
    Connect = 1000,
    Exit = 1001,
    EnableDevice = 1002,
    DisableDevice = 1003,
    Restart = 1004,
    PowerOff = 1005,

    GetVersion = 1100,
    Auth = 1102,

    // Bulk transfer
    PrepareData = 1500,
    Data = 1501,
    FreeData = 1502,
    DataWrrq = 1503,
    DataRdy = 1504,

    // Tables
    DbRrq = 7,
    UserWrq = 8,
    UserTempRrq = 9,
    OptionsRrq = 11,
    AttLogRrq = 13,
    ClearData = 14,
    ClearAttLog = 15,
    DeleteUser = 18,

    GetFreeSizes = 50,

    GetTime = 201,
    SetTime = 202,

    RegEvent = 500,

    // Acknowledgements
    AckOk = 2000,
    AckError = 2001,
    AckData = 2002,
    AckRetry = 2003,
    AckRepeat = 2004,
    AckUnauth = 2005,
    AckUnknown = 0xFFFF,
    AckErrorCmd = 0xFFFD,
    AckErrorInit = 0xFFFC,
    AckErrorData = 0xFFFB,
}

impl Command {
    /// CMD_CONNECT and CMD_EXIT are bounded by the fixed handshake
    /// timeout instead of the session timeout
    pub fn is_handshake(self) -> bool {
        matches!(self, Self::Connect | Self::Exit)
    }

    /// Get command name
    pub fn name(self) -> &'static str {
        match self {
            Self::Connect => "CMD_CONNECT",
            Self::Exit => "CMD_EXIT",
            Self::EnableDevice => "CMD_ENABLEDEVICE",
            Self::DisableDevice => "CMD_DISABLEDEVICE",
            Self::Restart => "CMD_RESTART",
            Self::PowerOff => "CMD_POWEROFF",
            Self::GetVersion => "CMD_GET_VERSION",
            Self::Auth => "CMD_AUTH",
            Self::PrepareData => "CMD_PREPARE_DATA",
            Self::Data => "CMD_DATA",
            Self::FreeData => "CMD_FREE_DATA",
            Self::DataWrrq => "CMD_DATA_WRRQ",
            Self::DataRdy => "CMD_DATA_RDY",
            Self::DbRrq => "CMD_DB_RRQ",
            Self::UserWrq => "CMD_USER_WRQ",
            Self::UserTempRrq => "CMD_USERTEMP_RRQ",
            Self::OptionsRrq => "CMD_OPTIONS_RRQ",
            Self::AttLogRrq => "CMD_ATTLOG_RRQ",
            Self::ClearData => "CMD_CLEAR_DATA",
            Self::ClearAttLog => "CMD_CLEAR_ATTLOG",
            Self::DeleteUser => "CMD_DELETE_USER",
            Self::GetFreeSizes => "CMD_GET_FREE_SIZES",
            Self::GetTime => "CMD_GET_TIME",
            Self::SetTime => "CMD_SET_TIME",
            Self::RegEvent => "CMD_REG_EVENT",
            Self::AckOk => "CMD_ACK_OK",
            Self::AckError => "CMD_ACK_ERROR",
            Self::AckData => "CMD_ACK_DATA",
            Self::AckRetry => "CMD_ACK_RETRY",
            Self::AckRepeat => "CMD_ACK_REPEAT",
            Self::AckUnauth => "CMD_ACK_UNAUTH",
            Self::AckUnknown => "CMD_ACK_UNKNOWN",
            Self::AckErrorCmd => "CMD_ACK_ERROR_CMD",
            Self::AckErrorInit => "CMD_ACK_ERROR_INIT",
            Self::AckErrorData => "CMD_ACK_ERROR_DATA",
        }
    }

    /// Human-readable name for any raw command id
    pub fn name_of(code: u16) -> &'static str {
        Self::try_from(code)
            .map(Self::name)
            .unwrap_or("AN UNKNOWN ERROR")
    }
}

impl From<Command> for u16 {
    fn from(cmd: Command) -> u16 {
        cmd as u16
    }
}

impl TryFrom<u16> for Command {
    type Error = Error;

    fn try_from(value: u16) -> Result<Self> {
        match value {
            1000 => Ok(Self::Connect),
            1001 => Ok(Self::Exit),
            1002 => Ok(Self::EnableDevice),
            1003 => Ok(Self::DisableDevice),
            1004 => Ok(Self::Restart),
            1005 => Ok(Self::PowerOff),
            1100 => Ok(Self::GetVersion),
            1102 => Ok(Self::Auth),
            1500 => Ok(Self::PrepareData),
            1501 => Ok(Self::Data),
            1502 => Ok(Self::FreeData),
            1503 => Ok(Self::DataWrrq),
            1504 => Ok(Self::DataRdy),
            7 => Ok(Self::DbRrq),
            8 => Ok(Self::UserWrq),
            9 => Ok(Self::UserTempRrq),
            11 => Ok(Self::OptionsRrq),
            13 => Ok(Self::AttLogRrq),
            14 => Ok(Self::ClearData),
            15 => Ok(Self::ClearAttLog),
            18 => Ok(Self::DeleteUser),
            50 => Ok(Self::GetFreeSizes),
            201 => Ok(Self::GetTime),
            202 => Ok(Self::SetTime),
            500 => Ok(Self::RegEvent),
            2000 => Ok(Self::AckOk),
            2001 => Ok(Self::AckError),
            2002 => Ok(Self::AckData),
            2003 => Ok(Self::AckRetry),
            2004 => Ok(Self::AckRepeat),
            2005 => Ok(Self::AckUnauth),
            0xFFFF => Ok(Self::AckUnknown),
            0xFFFD => Ok(Self::AckErrorCmd),
            0xFFFC => Ok(Self::AckErrorInit),
            0xFFFB => Ok(Self::AckErrorData),
            _ => Err(Error::UnknownCommand(value)),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), *self as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_conversion() {
        assert_eq!(u16::from(Command::DataWrrq), 1503);
        assert_eq!(Command::try_from(1504).unwrap(), Command::DataRdy);
    }

    #[test]
    fn test_handshake_commands() {
        assert!(Command::Connect.is_handshake());
        assert!(Command::Exit.is_handshake());
        assert!(!Command::FreeData.is_handshake());
    }

    #[test]
    fn test_name_of_unknown_code() {
        assert_eq!(Command::name_of(2001), "CMD_ACK_ERROR");
        assert_eq!(Command::name_of(9999), "AN UNKNOWN ERROR");
    }

    #[test]
    fn test_unknown_command() {
        let result = Command::try_from(9999);
        assert!(matches!(result, Err(Error::UnknownCommand(9999))));
    }
}
