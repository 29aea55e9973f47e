// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use modbus_engine::{
    client::{Client, Reader as _, Writer as _},
    ExceptionCode, FunctionCode, Message,
};

/// Answers every request with an exception specific to its function.
pub fn respond(request: &Message) -> Option<Message> {
    use FunctionCode::*;

    let exception = match request.function() {
        ReadCoils => ExceptionCode::Acknowledge,
        ReadDiscreteInputs => ExceptionCode::GatewayPathUnavailable,
        WriteSingleCoil => ExceptionCode::GatewayTargetDevice,
        WriteMultipleCoils => ExceptionCode::IllegalDataAddress,
        ReadInputRegisters => ExceptionCode::IllegalDataValue,
        ReadHoldingRegisters => ExceptionCode::IllegalFunction,
        WriteSingleRegister => ExceptionCode::MemoryParityError,
        WriteMultipleRegisters => ExceptionCode::ServerDeviceBusy,
        MaskWriteRegister => ExceptionCode::ServerDeviceFailure,
        ReadFifoQueue => ExceptionCode::Custom(0x42),
        _ => ExceptionCode::IllegalFunction,
    };
    Some(Message::exception(
        request.unit_id(),
        request.function(),
        exception,
    ))
}

pub async fn check_client(client: &Client, unit_id: u8) {
    let response = client.read_coils(unit_id, 0x00, 2).await.unwrap();
    assert!(matches!(response, Err(ExceptionCode::Acknowledge)));

    let response = client
        .read_discrete_inputs(unit_id, 0x00, 2)
        .await
        .expect("communication failed");
    assert!(matches!(
        response,
        Err(ExceptionCode::GatewayPathUnavailable)
    ));

    let response = client
        .write_single_coil(unit_id, 0x00, true)
        .await
        .expect("communication failed");
    assert!(matches!(response, Err(ExceptionCode::GatewayTargetDevice)));

    let response = client
        .write_multiple_coils(unit_id, 0x00, &[true])
        .await
        .expect("communication failed");
    assert!(matches!(response, Err(ExceptionCode::IllegalDataAddress)));

    let response = client
        .read_input_registers(unit_id, 0x00, 2)
        .await
        .expect("communication failed");
    assert!(matches!(response, Err(ExceptionCode::IllegalDataValue)));

    let response = client
        .read_holding_registers(unit_id, 0x00, 2)
        .await
        .expect("communication failed");
    assert!(matches!(response, Err(ExceptionCode::IllegalFunction)));

    let response = client
        .write_single_register(unit_id, 0x00, 42)
        .await
        .expect("communication failed");
    assert!(matches!(response, Err(ExceptionCode::MemoryParityError)));

    let response = client
        .write_multiple_registers(unit_id, 0x00, &[42])
        .await
        .expect("communication failed");
    assert!(matches!(response, Err(ExceptionCode::ServerDeviceBusy)));

    let response = client
        .masked_write_register(unit_id, 0x00, 0, 0)
        .await
        .expect("communication failed");
    assert!(matches!(response, Err(ExceptionCode::ServerDeviceFailure)));

    let response = client
        .read_write_multiple_registers(unit_id, 0x00, 1, 0x00, &[42])
        .await
        .expect("communication failed");
    assert!(matches!(response, Err(ExceptionCode::IllegalFunction)));

    let response = client
        .read_fifo_queue(unit_id, 0x00)
        .await
        .expect("communication failed");
    assert!(matches!(response, Err(ExceptionCode::Custom(0x42))));
}
